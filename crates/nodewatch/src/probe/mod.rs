/// Probe module - bounded-time reachability checks against single nodes
///
/// - `client`: the [`Prober`] seam and its HTTP implementation
/// - `transport`: how each probe picks its route (direct or via proxy)
pub mod client;
pub mod transport;

pub use client::{ProbeClient, Prober, Reachability};
pub use transport::{TransportPolicy, TransportSelector};
