//! One full probing pass over the coordinator's node list.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{ReportError, RoundError};
use crate::history::OutcomeHistory;
use crate::ledger::UptimeLedger;
use crate::probe::Prober;
use crate::reporting::{Coordinator, RetryPolicy};
use crate::types::{Node, ProbeOutcome};

/// Knobs for a round
#[derive(Debug, Clone, Copy)]
pub struct RoundSettings {
    /// Credited to a node's uptime or downtime once per round
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub max_concurrency: usize,
    pub report_retry: RetryPolicy,
    pub node_list_retry: RetryPolicy,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            probe_timeout: Duration::from_millis(crate::DEFAULT_PROBE_TIMEOUT_MS),
            max_concurrency: 32,
            report_retry: RetryPolicy::once(),
            node_list_retry: RetryPolicy::once(),
        }
    }
}

/// What a completed round did
#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub outcomes: Vec<ProbeOutcome>,
    pub reported: usize,
    pub report_failures: usize,
    /// Reports skipped because no credential was available
    pub unauthenticated: usize,
    pub persisted: bool,
}

impl RoundSummary {
    pub fn online(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_online()).count()
    }

    pub fn outcome(&self, node_id: &str) -> Option<&ProbeOutcome> {
        self.outcomes.iter().find(|outcome| outcome.node_id == node_id)
    }
}

enum Delivery {
    Reported,
    Unauthenticated,
    Failed,
}

pub struct ProbeRound {
    coordinator: Arc<dyn Coordinator>,
    prober: Arc<dyn Prober>,
    ledger: Arc<UptimeLedger>,
    history: Option<Arc<OutcomeHistory>>,
    settings: RoundSettings,
}

impl ProbeRound {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        prober: Arc<dyn Prober>,
        ledger: Arc<UptimeLedger>,
        settings: RoundSettings,
    ) -> Self {
        Self { coordinator, prober, ledger, history: None, settings }
    }

    pub fn with_history(mut self, history: Arc<OutcomeHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Fetch nodes, probe and report each independently, then persist.
    ///
    /// Only a failed node list aborts the round, and it does so before the
    /// ledger is touched.
    pub async fn run(&self) -> Result<RoundSummary, RoundError> {
        let nodes = self
            .settings
            .node_list_retry
            .run("Node list fetch", || self.coordinator.fetch_nodes())
            .await
            .map_err(|e| {
                warn!("Probe round aborted, node list unavailable: {}", e);
                RoundError::NodeList(e)
            })?;
        info!("Probe round started for {} nodes", nodes.len());

        let results: Vec<(ProbeOutcome, Delivery)> = stream::iter(nodes)
            .map(|node| self.process_node(node))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        // Every per-node ledger update has completed at this point
        let persisted = match self.ledger.save() {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to persist uptime ledger, keeping in-memory state: {}", e);
                false
            }
        };

        let mut summary = RoundSummary { persisted, ..RoundSummary::default() };
        for (outcome, delivery) in results {
            match delivery {
                Delivery::Reported => summary.reported += 1,
                Delivery::Unauthenticated => summary.unauthenticated += 1,
                Delivery::Failed => summary.report_failures += 1,
            }
            summary.outcomes.push(outcome);
        }

        if let Some(history) = &self.history {
            history.append(&summary.outcomes);
            if let Err(e) = history.save() {
                warn!("Failed to persist outcome history: {}", e);
            }
        }

        if summary.unauthenticated > 0 {
            warn!("No credential available, {} results were not reported", summary.unauthenticated);
        }
        info!(
            "Probe round finished: {}/{} online, {} reported, {} report failures",
            summary.online(),
            summary.outcomes.len(),
            summary.reported,
            summary.report_failures
        );

        Ok(summary)
    }

    async fn process_node(&self, node: Node) -> (ProbeOutcome, Delivery) {
        let reachability = self.prober.probe(&node, self.settings.probe_timeout).await;
        let outcome = ProbeOutcome::new(&node, reachability.latency_ms());

        if outcome.is_online() {
            debug!(node_id = %node.node_id, latency_ms = outcome.latency_ms, "Node online");
        } else {
            info!(node_id = %node.node_id, ip = %node.ip, "Node unreachable");
        }

        let interval_ms = self.settings.interval.as_millis() as u64;
        let uptime = self.ledger.record_outcome(&outcome.node_id, outcome.status, interval_ms);

        let delivery = match self
            .settings
            .report_retry
            .run("Submitting test result", || self.coordinator.submit_test_result(&outcome, uptime))
            .await
        {
            Ok(()) => Delivery::Reported,
            Err(ReportError::NoCredential) => Delivery::Unauthenticated,
            Err(e) => {
                warn!(node_id = %node.node_id, "Failed to report test result: {}", e);
                Delivery::Failed
            }
        };

        (outcome, delivery)
    }
}

#[async_trait::async_trait]
impl crate::scheduler::PeriodicTask for ProbeRound {
    fn name(&self) -> &'static str {
        "probe-round"
    }

    async fn run(&self) {
        // Failures are already logged inside the round
        let _ = ProbeRound::run(self).await;
    }
}
