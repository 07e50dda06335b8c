use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::context::AgentIdentity;
use crate::error::ReportError;
use crate::location::Geolocator;
use crate::reporting::{Coordinator, Heartbeat, RetryPolicy};

/// Result of one heartbeat attempt sequence
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatOutcome {
    Sent(Heartbeat),
    NoCredential,
    Failed(ReportError),
}

/// Reports the agent's own liveness and location
pub struct HeartbeatTask {
    coordinator: Arc<dyn Coordinator>,
    identity: Arc<AgentIdentity>,
    locator: Arc<dyn Geolocator>,
    retry: RetryPolicy,
}

impl HeartbeatTask {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        identity: Arc<AgentIdentity>,
        locator: Arc<dyn Geolocator>,
        retry: RetryPolicy,
    ) -> Self {
        Self { coordinator, identity, locator, retry }
    }

    pub async fn run(&self) -> HeartbeatOutcome {
        if self.identity.token().is_none() {
            warn!("No credential available, skipping heartbeat");
            return HeartbeatOutcome::NoCredential;
        }

        let location = self.locator.locate().await;
        self.identity.remember_location(location.clone());

        let heartbeat = Heartbeat { ip: location.ip, location: location.location, timestamp: Utc::now() };

        match self.retry.run("Heartbeat", || self.coordinator.submit_heartbeat(&heartbeat)).await {
            Ok(()) => {
                info!("Heartbeat sent from {} ({})", heartbeat.ip, heartbeat.location);
                HeartbeatOutcome::Sent(heartbeat)
            }
            Err(ReportError::NoCredential) => {
                warn!("Credential disappeared before heartbeat was sent");
                HeartbeatOutcome::NoCredential
            }
            Err(e) => {
                warn!("Heartbeat failed, waiting for next tick: {}", e);
                HeartbeatOutcome::Failed(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::scheduler::PeriodicTask for HeartbeatTask {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn run(&self) {
        HeartbeatTask::run(self).await;
    }
}
