use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::transport::TransportSelector;
use crate::timeout::bounded;
use crate::types::Node;

/// What a single probe observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Milliseconds until the first response, never zero
    Reachable(u64),
    Unreachable,
}

impl Reachability {
    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            Reachability::Reachable(ms) => Some(*ms),
            Reachability::Unreachable => None,
        }
    }
}

/// Prober trait for bounded reachability checks
///
/// Implementations never fail: every error collapses into
/// [`Reachability::Unreachable`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, node: &Node, timeout: Duration) -> Reachability;
}

/// HTTP prober: one unauthenticated GET, timed to the response head
pub struct ProbeClient {
    transport: TransportSelector,
}

impl ProbeClient {
    pub fn new(transport: TransportSelector) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Prober for ProbeClient {
    async fn probe(&self, node: &Node, timeout: Duration) -> Reachability {
        let url = target_url(&node.ip);
        let (route, client) = self.transport.select();

        let start = Instant::now();
        // `send` resolves once the status line and headers arrive; the body
        // is never read.
        match bounded(timeout, client.get(&url).send()).await {
            Ok(response) => {
                let latency = (start.elapsed().as_millis() as u64).max(1);
                debug!(
                    node_id = %node.node_id,
                    route,
                    status = response.status().as_u16(),
                    latency_ms = latency,
                    "Probe answered"
                );
                Reachability::Reachable(latency)
            }
            Err(error) => {
                debug!(node_id = %node.node_id, route, %url, "Probe unreachable: {}", error);
                Reachability::Unreachable
            }
        }
    }
}

/// Turn a node address into a URL: full URLs pass through, bare hosts get
/// `http://`, bare IPv6 literals get brackets.
pub fn target_url(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else if address.parse::<Ipv6Addr>().is_ok() {
        format!("http://[{address}]/")
    } else {
        format!("http://{address}/")
    }
}
