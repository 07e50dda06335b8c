use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UNREACHABLE_LATENCY;

/// A remote endpoint under test, as handed out by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(alias = "id")]
    pub node_id: String,
    pub ip: String,
}

impl Node {
    pub fn new(node_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), ip: ip.into() }
    }
}

/// Reachability of a node, derived from its measured latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
}

impl NodeStatus {
    /// `latency > 0` means online; anything else, including the
    /// unreachable sentinel, means offline.
    pub fn from_latency(latency_ms: i64) -> Self {
        if latency_ms > 0 { NodeStatus::Online } else { NodeStatus::Offline }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Result of probing one node in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub node_id: String,
    pub ip: String,
    /// Milliseconds to first response, or `-1` when unreachable
    pub latency_ms: i64,
    pub status: NodeStatus,
    pub observed_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// Build an outcome for `node`; the status always follows the latency.
    pub fn new(node: &Node, latency_ms: Option<u64>) -> Self {
        let latency_ms = latency_ms
            .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX))
            .unwrap_or(UNREACHABLE_LATENCY);

        Self {
            node_id: node.node_id.clone(),
            ip: node.ip.clone(),
            latency_ms,
            status: NodeStatus::from_latency(latency_ms),
            observed_at: Utc::now(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

/// Accumulated time a node has been seen online and offline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptimeSnapshot {
    pub uptime_ms: u64,
    pub downtime_ms: u64,
}
