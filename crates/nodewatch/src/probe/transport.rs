//! Route selection for outgoing probes.
//!
//! A selector owns one prepared `reqwest::Client` per route and hands one
//! out per probe according to its [`TransportPolicy`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a probe chooses among the configured proxies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportPolicy {
    /// No proxy; proxy list is ignored
    Direct,
    /// Always the first proxy
    Fixed,
    /// A uniformly random proxy per probe
    Random,
    /// Proxies in turn
    RoundRobin,
}

impl TransportPolicy {
    pub fn needs_proxies(&self) -> bool {
        !matches!(self, TransportPolicy::Direct)
    }
}

impl fmt::Display for TransportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportPolicy::Direct => write!(f, "direct"),
            TransportPolicy::Fixed => write!(f, "fixed"),
            TransportPolicy::Random => write!(f, "random"),
            TransportPolicy::RoundRobin => write!(f, "round-robin"),
        }
    }
}

/// Hands out a client per probe
pub struct TransportSelector {
    policy: TransportPolicy,
    routes: Vec<Route>,
    cursor: AtomicUsize,
}

struct Route {
    label: String,
    client: reqwest::Client,
}

impl TransportSelector {
    /// Build one client per route; `Direct` (or an empty proxy list)
    /// yields a single direct route.
    pub fn new(
        policy: TransportPolicy,
        proxies: &[String],
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let routes = if policy.needs_proxies() && !proxies.is_empty() {
            proxies
                .iter()
                .map(|proxy| -> Result<Route, reqwest::Error> {
                    let client = client_builder(timeout).proxy(reqwest::Proxy::all(proxy)?).build()?;
                    Ok(Route { label: proxy.clone(), client })
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let client = client_builder(timeout).no_proxy().build()?;
            vec![Route { label: "direct".to_string(), client }]
        };

        Ok(Self { policy, routes, cursor: AtomicUsize::new(0) })
    }

    pub fn direct(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::new(TransportPolicy::Direct, &[], timeout)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Index of the route the next probe should use
    pub fn next_index(&self) -> usize {
        let len = self.routes.len();
        if len <= 1 {
            return 0;
        }
        match self.policy {
            TransportPolicy::Direct | TransportPolicy::Fixed => 0,
            TransportPolicy::Random => rand::thread_rng().gen_range(0..len),
            TransportPolicy::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % len,
        }
    }

    /// Pick a route; returns its label (for logging) and client
    pub fn select(&self) -> (&str, &reqwest::Client) {
        let route = &self.routes[self.next_index()];
        (route.label.as_str(), &route.client)
    }
}

fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("nodewatch/", env!("CARGO_PKG_VERSION")))
}
