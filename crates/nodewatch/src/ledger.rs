//! Durable per-node uptime and downtime accumulators.
//!
//! The ledger file is a JSON object keyed by node id:
//! `{ "<node_id>": { "uptime_ms": 0, "downtime_ms": 0 } }`.
//! Loading never fails; saving goes through a temp file and a rename so a
//! crash mid-write leaves the previous file intact.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::types::{NodeStatus, UptimeSnapshot};

/// In-memory ledger bound to its file
#[derive(Debug)]
pub struct UptimeLedger {
    path: PathBuf,
    records: Mutex<BTreeMap<String, UptimeSnapshot>>,
}

impl UptimeLedger {
    /// Empty ledger that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), records: Mutex::new(BTreeMap::new()) }
    }

    /// Load the ledger from `path`.
    ///
    /// A missing, unreadable or malformed file yields an empty ledger;
    /// the next save overwrites whatever was there.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, UptimeSnapshot>>(&raw) {
                Ok(records) => {
                    debug!("Loaded uptime ledger with {} nodes from {}", records.len(), path.display());
                    records
                }
                Err(e) => {
                    warn!("Uptime ledger {} is malformed, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No uptime ledger at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("Failed to read uptime ledger {}, starting empty: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self { path, records: Mutex::new(records) }
    }

    /// Add `interval_ms` to the bucket matching `status`, creating a zeroed
    /// record on first sight. Call exactly once per node per round.
    pub fn record_outcome(&self, node_id: &str, status: NodeStatus, interval_ms: u64) -> UptimeSnapshot {
        let mut records = self.lock();
        let record = records.entry(node_id.to_string()).or_default();
        match status {
            NodeStatus::Online => record.uptime_ms = record.uptime_ms.saturating_add(interval_ms),
            NodeStatus::Offline => record.downtime_ms = record.downtime_ms.saturating_add(interval_ms),
        }
        *record
    }

    /// Current totals for `node_id`; zero if never seen
    pub fn snapshot(&self, node_id: &str) -> UptimeSnapshot {
        self.lock().get(node_id).copied().unwrap_or_default()
    }

    /// Copy of every record
    pub fn entries(&self) -> BTreeMap<String, UptimeSnapshot> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Persist the full ledger.
    ///
    /// The records stay locked until the rename completes, so concurrent
    /// saves never share the temp file and the last one to finish wrote the
    /// newest totals.
    pub fn save(&self) -> Result<(), LedgerError> {
        let records = self.lock();
        let json = serde_json::to_string_pretty(&*records)?;
        write_atomic(&self.path, json.as_bytes())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, UptimeSnapshot>> {
        // Records are plain counters; a panic elsewhere cannot leave them
        // half-updated.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write `contents` next to `path` and rename over it
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io { path: path.display().to_string(), source };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut temp_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, contents).map_err(io_err)?;
    fs::rename(&temp_path, path).map_err(io_err)
}
