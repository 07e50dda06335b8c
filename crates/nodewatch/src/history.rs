//! Bounded log of recent probe outcomes, kept next to the ledger.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::ledger::write_atomic;
use crate::types::ProbeOutcome;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

pub struct OutcomeHistory {
    path: PathBuf,
    limit: usize,
    entries: Mutex<VecDeque<ProbeOutcome>>,
}

impl OutcomeHistory {
    /// Load up to `limit` most recent entries; unreadable files start empty.
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let mut entries: VecDeque<ProbeOutcome> = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Outcome history {} is malformed, starting empty: {}", path.display(), e);
                VecDeque::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No outcome history at {}, starting empty", path.display());
                VecDeque::new()
            }
            Err(e) => {
                warn!("Failed to read outcome history {}, starting empty: {}", path.display(), e);
                VecDeque::new()
            }
        };
        while entries.len() > limit {
            entries.pop_front();
        }

        Self { path, limit, entries: Mutex::new(entries) }
    }

    /// Append outcomes, dropping the oldest beyond the limit
    pub fn append(&self, outcomes: &[ProbeOutcome]) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.extend(outcomes.iter().cloned());
        while entries.len() > self.limit {
            entries.pop_front();
        }
    }

    pub fn recent(&self) -> Vec<ProbeOutcome> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).iter().cloned().collect()
    }

    /// Persist the log; held under the entries lock like the ledger save
    pub fn save(&self) -> Result<(), LedgerError> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let json = serde_json::to_string_pretty(&*entries)?;
        write_atomic(&self.path, json.as_bytes())
    }
}
