//! Independent periodic triggers.
//!
//! Each registered task gets its own timer loop, so a slow probe round
//! never delays the heartbeat. Every timer fires once immediately on start.
//! When a tick arrives while the previous run of the same task is still in
//! flight, the [`OverlapPolicy`] decides whether it is skipped or runs
//! alongside.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A unit of periodic work
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One invocation; failures are handled and logged inside
    async fn run(&self);
}

/// What to do when a tick arrives while the previous run is still going
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    Skip,
    Allow,
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapPolicy::Skip => write!(f, "skip"),
            OverlapPolicy::Allow => write!(f, "allow"),
        }
    }
}

/// Counters for one registered task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub started: u64,
    pub skipped: u64,
    pub in_flight: usize,
}

struct Entry {
    task: Arc<dyn PeriodicTask>,
    period: Duration,
    in_flight: AtomicUsize,
    started: AtomicU64,
    skipped: AtomicU64,
}

/// Decrements the in-flight count when a run ends, cancelled or not
struct RunGuard(Arc<Entry>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Entry {
    fn try_begin(self: &Arc<Self>, overlap: OverlapPolicy) -> Option<RunGuard> {
        let admitted = match overlap {
            OverlapPolicy::Skip => {
                self.in_flight.compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst).is_ok()
            }
            OverlapPolicy::Allow => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                true
            }
        };

        if admitted {
            self.started.fetch_add(1, Ordering::Relaxed);
            Some(RunGuard(Arc::clone(self)))
        } else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    fn stats(&self) -> TaskStats {
        TaskStats {
            started: self.started.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }
}

async fn run_guarded(guard: RunGuard, cancel: CancellationToken) {
    let task = Arc::clone(&guard.0.task);
    tokio::select! {
        _ = cancel.cancelled() => debug!(task = task.name(), "Run abandoned on shutdown"),
        _ = task.run() => debug!(task = task.name(), "Run finished"),
    }
}

/// Registry of periodic tasks sharing one cancellation token
#[derive(Clone)]
pub struct Scheduler {
    entries: Vec<Arc<Entry>>,
    overlap: OverlapPolicy,
    cancel: CancellationToken,
}

/// Outcome of a manual trigger
pub enum Trigger {
    Started(JoinHandle<()>),
    Skipped,
    UnknownTask,
}

impl Scheduler {
    pub fn new(overlap: OverlapPolicy, cancel: CancellationToken) -> Self {
        Self { entries: Vec::new(), overlap, cancel }
    }

    pub fn register(&mut self, task: Arc<dyn PeriodicTask>, period: Duration) -> &mut Self {
        self.entries.push(Arc::new(Entry {
            task,
            period,
            in_flight: AtomicUsize::new(0),
            started: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }));
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.task.name()).collect()
    }

    pub fn stats(&self, name: &str) -> Option<TaskStats> {
        self.entry(name).map(|entry| entry.stats())
    }

    fn entry(&self, name: &str) -> Option<&Arc<Entry>> {
        self.entries.iter().find(|entry| entry.task.name() == name)
    }

    /// Run `name` once now, outside its timer, under the same overlap policy
    pub fn trigger(&self, name: &str) -> Trigger {
        let Some(entry) = self.entry(name) else {
            return Trigger::UnknownTask;
        };

        match entry.try_begin(self.overlap) {
            Some(guard) => Trigger::Started(tokio::spawn(run_guarded(guard, self.cancel.clone()))),
            None => Trigger::Skipped,
        }
    }

    /// Arm one timer per task. The first tick of each fires immediately.
    pub fn start(&self) -> SchedulerHandle {
        let timers = self
            .entries
            .iter()
            .map(|entry| {
                info!(task = entry.task.name(), period = ?entry.period, "Arming periodic task");
                tokio::spawn(timer_loop(Arc::clone(entry), self.overlap, self.cancel.clone()))
            })
            .collect();

        SchedulerHandle { cancel: self.cancel.clone(), timers }
    }
}

async fn timer_loop(entry: Arc<Entry>, overlap: OverlapPolicy, cancel: CancellationToken) {
    let mut ticker = interval(entry.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut runs = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match entry.try_begin(overlap) {
                Some(guard) => {
                    runs.spawn(run_guarded(guard, cancel.clone()));
                }
                None => warn!(
                    task = entry.task.name(),
                    "Previous run still in progress, skipping this tick"
                ),
            },
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                if let Err(e) = joined {
                    warn!(task = entry.task.name(), "Run ended abnormally: {}", e);
                }
            }
        }
    }

    // In-flight runs observe the same token and return promptly
    while runs.join_next().await.is_some() {}
    debug!(task = entry.task.name(), "Timer stopped");
}

/// Running timers; dropping it leaves them running until the token fires
pub struct SchedulerHandle {
    cancel: CancellationToken,
    timers: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop all timers and wait for in-flight runs to be abandoned
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for timer in self.timers {
            if let Err(e) = timer.await {
                warn!("Timer task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}
