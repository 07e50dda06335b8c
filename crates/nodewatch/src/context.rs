//! Everything a task invocation needs, built once at startup.

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::credentials::{CredentialSource, TokenFile};
use crate::heartbeat::HeartbeatTask;
use crate::history::OutcomeHistory;
use crate::ledger::UptimeLedger;
use crate::location::{Geolocator, IpApiLocator, Location, NoLocation};
use crate::points::PointsRefresh;
use crate::probe::{ProbeClient, Prober, TransportSelector};
use crate::reporting::{Coordinator, HttpCoordinator};
use crate::round::{ProbeRound, RoundSettings};
use crate::scheduler::Scheduler;

/// The agent's own credential and last observed facts about itself
pub struct AgentIdentity {
    credentials: Arc<dyn CredentialSource>,
    last_location: RwLock<Option<Location>>,
    last_points: RwLock<Option<f64>>,
}

impl AgentIdentity {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self { credentials, last_location: RwLock::new(None), last_points: RwLock::new(None) }
    }

    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        Arc::clone(&self.credentials)
    }

    pub fn token(&self) -> Option<String> {
        self.credentials.token()
    }

    pub fn last_location(&self) -> Option<Location> {
        self.last_location.read().ok().and_then(|guard| guard.clone())
    }

    pub fn remember_location(&self, location: Location) {
        if let Ok(mut guard) = self.last_location.write() {
            *guard = Some(location);
        }
    }

    pub fn last_points(&self) -> Option<f64> {
        self.last_points.read().ok().and_then(|guard| *guard)
    }

    /// Store the new balance, returning the previous one
    pub fn remember_points(&self, points: f64) -> Option<f64> {
        self.last_points.write().ok().and_then(|mut guard| guard.replace(points))
    }
}

/// Shared handles passed to every task
#[derive(Clone)]
pub struct AgentContext {
    pub config: Arc<Config>,
    pub identity: Arc<AgentIdentity>,
    pub ledger: Arc<UptimeLedger>,
    pub history: Option<Arc<OutcomeHistory>>,
    pub coordinator: Arc<dyn Coordinator>,
    pub prober: Arc<dyn Prober>,
    pub locator: Arc<dyn Geolocator>,
}

impl AgentContext {
    /// Wire the HTTP implementations from `config` and load persisted state
    pub fn from_config(config: Config) -> Result<Self, reqwest::Error> {
        let credentials: Arc<dyn CredentialSource> =
            Arc::new(TokenFile::new(config.coordinator.token_path.clone()));

        let coordinator: Arc<dyn Coordinator> = Arc::new(HttpCoordinator::new(
            config.coordinator.base_url.clone(),
            config.request_timeout(),
            Arc::clone(&credentials),
        )?);

        let transport =
            TransportSelector::new(config.probe.transport, &config.probe.proxies, config.probe_timeout())?;
        info!("Probing over {} transport with {} route(s)", config.probe.transport, transport.route_count());
        let prober: Arc<dyn Prober> = Arc::new(ProbeClient::new(transport));

        let locator: Arc<dyn Geolocator> = if config.location.enabled {
            Arc::new(IpApiLocator::new(config.location.lookup_url.clone(), config.request_timeout())?)
        } else {
            Arc::new(NoLocation)
        };

        let ledger = Arc::new(UptimeLedger::load(config.storage.ledger_path.clone()));
        info!("Uptime ledger tracks {} nodes", ledger.len());

        let history = config
            .storage
            .history_path
            .clone()
            .map(|path| Arc::new(OutcomeHistory::load(path, config.storage.history_limit)));

        Ok(Self {
            config: Arc::new(config),
            identity: Arc::new(AgentIdentity::new(credentials)),
            ledger,
            history,
            coordinator,
            prober,
            locator,
        })
    }

    pub fn round_settings(&self) -> RoundSettings {
        RoundSettings {
            interval: self.config.probe_interval(),
            probe_timeout: self.config.probe_timeout(),
            max_concurrency: self.config.probe.max_concurrency,
            report_retry: self.config.report_retry(),
            node_list_retry: self.config.node_list_retry(),
        }
    }

    pub fn probe_round(&self) -> ProbeRound {
        let round = ProbeRound::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.prober),
            Arc::clone(&self.ledger),
            self.round_settings(),
        );
        match &self.history {
            Some(history) => round.with_history(Arc::clone(history)),
            None => round,
        }
    }

    pub fn heartbeat_task(&self) -> HeartbeatTask {
        HeartbeatTask::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.identity),
            Arc::clone(&self.locator),
            self.config.heartbeat_retry(),
        )
    }

    pub fn points_refresh(&self) -> PointsRefresh {
        PointsRefresh::new(Arc::clone(&self.coordinator), Arc::clone(&self.identity))
            .with_retry(self.config.points_retry())
    }

    /// Scheduler with the probe round, heartbeat and points refresh
    /// registered at their configured cadences
    pub fn scheduler(&self, cancel: CancellationToken) -> Scheduler {
        let mut scheduler = Scheduler::new(self.config.schedule.overlap, cancel);
        scheduler
            .register(Arc::new(self.probe_round()), self.config.probe_interval())
            .register(Arc::new(self.heartbeat_task()), self.config.heartbeat_interval())
            .register(Arc::new(self.points_refresh()), self.config.points_interval());
        scheduler
    }
}
