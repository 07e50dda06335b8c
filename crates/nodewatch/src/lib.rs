//! Nodewatch - probe scheduling and reporting pipeline
//!
//! The agent periodically pulls the list of nodes from a coordinator,
//! probes each one under a timeout, accumulates per-node uptime and
//! downtime in a durable ledger and reports every outcome back. A
//! heartbeat and a points refresh run on their own timers.

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod heartbeat;
pub mod history;
pub mod ledger;
pub mod location;
pub mod points;
pub mod probe;
pub mod reporting;
pub mod round;
pub mod scheduler;
pub mod timeout;
pub mod types;

// Re-export main types
pub use config::Config;
pub use context::{AgentContext, AgentIdentity};
pub use error::{LedgerError, ReportError, RoundError};
pub use heartbeat::HeartbeatTask;
pub use ledger::UptimeLedger;
pub use points::PointsRefresh;
pub use probe::{ProbeClient, Prober};
pub use reporting::{Coordinator, HttpCoordinator, RetryPolicy};
pub use round::{ProbeRound, RoundSummary};
pub use scheduler::{OverlapPolicy, PeriodicTask, Scheduler, SchedulerHandle};
pub use types::{Node, NodeStatus, ProbeOutcome, UptimeSnapshot};

/// Latency reported for a node that could not be reached
pub const UNREACHABLE_LATENCY: i64 = -1;

/// Default probe timeout in milliseconds
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
