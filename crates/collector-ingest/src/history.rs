//! Import history ledger
//!
//! The set of input file names that were already imported, stored as one
//! name per line. The ledger is loaded once per run, consulted before each
//! file is read, and persisted sorted when the run ends.

use collector_common::Result;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const IMPORT_HISTORY_FILE: &str = "archives-import-history";

#[derive(Debug, Clone)]
pub struct ImportHistoryLedger {
    path: PathBuf,
    entries: BTreeSet<String>,
}

impl ImportHistoryLedger {
    /// Empty ledger persisted to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeSet::new(),
        }
    }

    /// Load the ledger at `path`
    ///
    /// A missing file is an empty ledger. A file that cannot be read is
    /// logged and also treated as empty, so earlier imports may be repeated.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut ledger = Self::new(path);
        if !ledger.path.exists() {
            return ledger;
        }
        match fs::read_to_string(&ledger.path) {
            Ok(content) => {
                ledger.entries = content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect();
                debug!(path = %ledger.path.display(), entries = ledger.entries.len(), "Loaded import history");
            },
            Err(e) => {
                warn!(
                    path = %ledger.path.display(),
                    error = %e,
                    "Could not read import history. Starting with an empty history."
                );
            },
        }
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn should_skip(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Returns false if `id` was already recorded
    pub fn record(&mut self, id: impl Into<String>) -> bool {
        self.entries.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the ledger file with every entry, sorted
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(entry);
            content.push('\n');
        }
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Persisted import history");
        Ok(())
    }
}
