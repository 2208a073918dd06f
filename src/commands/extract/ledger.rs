use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::info;

use crate::model::{LedgerEntry, ProcessingHistory};
use crate::util::{now_utc_string, read_json, write_json_pretty};

/// Content-hash ledger of documents already extracted.
///
/// Read once at the start of a run and written once at the end; concurrent runs
/// against the same ledger are not supported.
#[derive(Debug)]
pub struct ProcessingLedger {
    path: PathBuf,
    history: ProcessingHistory,
}

impl ProcessingLedger {
    pub fn load(path: &Path) -> Result<Self> {
        let history = if path.exists() {
            read_json(path)?
        } else {
            ProcessingHistory::default()
        };
        info!(
            path = %path.display(),
            entries = history.entries.len(),
            last_check = history.last_check.as_deref().unwrap_or("never"),
            "loaded processing ledger"
        );
        Ok(Self {
            path: path.to_path_buf(),
            history,
        })
    }

    pub fn contains(&self, sha256: &str) -> bool {
        self.history.entries.contains_key(sha256)
    }

    pub fn record(&mut self, sha256: &str, filename: &str, status: &str) {
        self.history.entries.insert(
            sha256.to_string(),
            LedgerEntry {
                filename: filename.to_string(),
                processed_at: now_utc_string(),
                status: status.to_string(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.history.entries.len()
    }

    pub fn save(&mut self) -> Result<()> {
        self.history.last_check = Some(now_utc_string());
        write_json_pretty(&self.path, &self.history)
    }
}
