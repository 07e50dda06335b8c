/// Reporting module - every call the agent makes to its coordinator
///
/// - `Coordinator`: the seam the round, heartbeat and points tasks talk to
/// - `http`: the REST implementation with bearer credential attachment
/// - `retry`: fixed-backoff retry policy usable around any call
pub mod http;
pub mod retry;

pub use http::HttpCoordinator;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::types::{Node, NodeStatus, ProbeOutcome, UptimeSnapshot};

/// Body of `POST /test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub node_id: String,
    pub ip: String,
    pub latency: i64,
    pub status: NodeStatus,
    pub uptime: u64,
    pub downtime: u64,
}

impl TestReport {
    pub fn new(outcome: &ProbeOutcome, uptime: UptimeSnapshot) -> Self {
        Self {
            node_id: outcome.node_id.clone(),
            ip: outcome.ip.clone(),
            latency: outcome.latency_ms,
            status: outcome.status,
            uptime: uptime.uptime_ms,
            downtime: uptime.downtime_ms,
        }
    }
}

/// Body of `POST /heartbeat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub ip: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// Coordinator trait for abstracting the remote REST service
///
/// All methods report failures as values; none of them are fatal.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Current list of nodes to probe
    async fn fetch_nodes(&self) -> Result<Vec<Node>, ReportError>;

    /// Report one probe outcome with the node's running totals
    async fn submit_test_result(
        &self,
        outcome: &ProbeOutcome,
        uptime: UptimeSnapshot,
    ) -> Result<(), ReportError>;

    /// Report this agent's own liveness
    async fn submit_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), ReportError>;

    /// Current point balance of this agent
    async fn fetch_points(&self) -> Result<f64, ReportError>;
}
