use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::AgentIdentity;
use crate::error::ReportError;
use crate::reporting::{Coordinator, RetryPolicy};

/// Keeps the agent's point balance current
pub struct PointsRefresh {
    coordinator: Arc<dyn Coordinator>,
    identity: Arc<AgentIdentity>,
    retry: RetryPolicy,
}

impl PointsRefresh {
    pub fn new(coordinator: Arc<dyn Coordinator>, identity: Arc<AgentIdentity>) -> Self {
        Self { coordinator, identity, retry: RetryPolicy::once() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the balance; the last known value is kept on failure
    pub async fn run(&self) -> Result<f64, ReportError> {
        match self.retry.run("Points refresh", || self.coordinator.fetch_points()).await {
            Ok(points) => {
                match self.identity.remember_points(points) {
                    Some(previous) if previous == points => debug!("Points unchanged at {}", points),
                    _ => info!("Points balance: {}", points),
                }
                Ok(points)
            }
            Err(ReportError::NoCredential) => {
                debug!("No credential available, skipping points refresh");
                Err(ReportError::NoCredential)
            }
            Err(e) => {
                warn!("Failed to refresh points: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::scheduler::PeriodicTask for PointsRefresh {
    fn name(&self) -> &'static str {
        "points-refresh"
    }

    async fn run(&self) {
        let _ = PointsRefresh::run(self).await;
    }
}
