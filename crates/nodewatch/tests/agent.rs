//! Whole agent wiring: scheduler driving the real tasks over fakes

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeCoordinator, FakeProber, FixedLocator};
use nodewatch::context::AgentIdentity;
use nodewatch::credentials::StaticToken;
use nodewatch::location::Location;
use nodewatch::scheduler::Trigger;
use nodewatch::{AgentContext, Config, Node, UptimeLedger};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

fn context(dir: &TempDir, coordinator: Arc<FakeCoordinator>, prober: Arc<FakeProber>) -> AgentContext {
    let mut config = Config::default();
    config.schedule.probe_interval_secs = 60;
    config.schedule.heartbeat_interval_secs = 10;
    config.schedule.points_interval_secs = 5;
    config.storage.ledger_path = dir.path().join("uptime.json");

    AgentContext {
        ledger: Arc::new(UptimeLedger::load(&config.storage.ledger_path)),
        config: Arc::new(config),
        identity: Arc::new(AgentIdentity::new(Arc::new(StaticToken(Some("tok".into()))))),
        history: None,
        coordinator,
        prober,
        locator: Arc::new(FixedLocator(Location::unknown())),
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_all_tasks_eagerly_and_periodically() {
    let dir = tempdir().unwrap();
    let coordinator =
        FakeCoordinator::with_nodes(vec![Node::new("A", "10.0.0.1"), Node::new("B", "10.0.0.2")]);
    *coordinator.points.lock().unwrap() = Some(Ok(7.0));
    let context = context(&dir, coordinator.clone(), FakeProber::new(&[("10.0.0.1", 50)]));

    let scheduler = context.scheduler(CancellationToken::new());
    let handle = scheduler.start();

    tokio::time::sleep(Duration::from_secs(75)).await;

    // Rounds at 0 and 60, each crediting a 60 s interval
    assert_eq!(scheduler.stats("probe-round").unwrap().started, 2);
    assert_eq!(context.ledger.snapshot("A").uptime_ms, 120_000);
    assert_eq!(context.ledger.snapshot("B").downtime_ms, 120_000);
    // Heartbeats at 0, 10, ..., 70 despite the rounds waiting on timeouts
    assert_eq!(coordinator.heartbeats.lock().unwrap().len(), 8);
    assert_eq!(context.identity.last_points(), Some(7.0));

    handle.shutdown().await;

    let reloaded = UptimeLedger::load(dir.path().join("uptime.json"));
    assert_eq!(reloaded.entries(), context.ledger.entries());
}

#[tokio::test(start_paused = true)]
async fn test_manual_round_trigger() {
    let dir = tempdir().unwrap();
    let coordinator = FakeCoordinator::with_nodes(vec![Node::new("A", "10.0.0.1")]);
    let context = context(&dir, coordinator.clone(), FakeProber::new(&[("10.0.0.1", 5)]));
    let scheduler = context.scheduler(CancellationToken::new());

    let Trigger::Started(run) = scheduler.trigger("probe-round") else {
        panic!("round should start");
    };
    run.await.unwrap();

    assert_eq!(coordinator.reports().len(), 1);
    assert_eq!(context.ledger.snapshot("A").uptime_ms, 60_000);
}
