//! Nodewatch agent - probes coordinator-assigned nodes and reports back
//!
//! Runs three independent timers until interrupted:
//! - probe round: fetch nodes, probe, update the uptime ledger, report
//! - heartbeat: report this agent's liveness and location
//! - points refresh: keep the point balance current

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use logger::LevelFilter;
use nodewatch::scheduler::{Scheduler, Trigger};
use nodewatch::{AgentContext, Config};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about = "Network probe agent")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/nodewatch/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run every task once and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;
    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    info!("Nodewatch agent v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Coordinator: {}", config.coordinator.base_url);

    let context = AgentContext::from_config(config).context("Failed to create agent context")?;
    if context.identity.token().is_none() {
        warn!(
            "No token found at {}, results and heartbeats will not be reported",
            context.config.coordinator.token_path.display()
        );
    }

    let scheduler = context.scheduler(CancellationToken::new());

    if cli.once {
        run_once(&scheduler).await;
        return Ok(());
    }

    let handle = scheduler.start();
    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;

    info!("Shutdown requested, stopping timers");
    handle.shutdown().await;
    Ok(())
}

/// One invocation of every registered task, concurrently
async fn run_once(scheduler: &Scheduler) {
    let runs: Vec<_> = scheduler
        .task_names()
        .into_iter()
        .filter_map(|name| match scheduler.trigger(name) {
            Trigger::Started(run) => Some((name, run)),
            Trigger::Skipped | Trigger::UnknownTask => None,
        })
        .collect();

    for (name, run) in runs {
        if let Err(e) = run.await {
            warn!("Task {} ended abnormally: {}", name, e);
        }
    }
}
