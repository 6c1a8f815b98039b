//! Hashed relay identity statistics
//!
//! Collects the SHA-1 hashes of relay identities seen in consensuses and
//! merges them into a sorted file, one hash per line.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::{DescriptorSink, SinkStage};
use crate::descriptor::ParsedDescriptor;

pub const HASHED_RELAYS_FILE: &str = "hashed-relay-identities";

pub struct HashedRelayStats {
    path: PathBuf,
    hashed_relays: BTreeSet<String>,
}

impl HashedRelayStats {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hashed_relays: BTreeSet::new(),
        }
    }

    pub fn add_hashed_relay(&mut self, hashed_identity: &str) {
        self.hashed_relays.insert(hashed_identity.to_string());
    }

    pub fn len(&self) -> usize {
        self.hashed_relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashed_relays.is_empty()
    }
}

impl DescriptorSink for HashedRelayStats {
    fn name(&self) -> &'static str {
        "hashed-relays"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Stats
    }

    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()> {
        if let ParsedDescriptor::Consensus(status) = descriptor {
            self.hashed_relays
                .extend(status.hashed_relay_identities.iter().cloned());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.hashed_relays.is_empty() {
            return Ok(());
        }

        let mut merged = BTreeSet::new();
        if self.path.exists() {
            match fs::read_to_string(&self.path) {
                Ok(content) => {
                    merged.extend(content.lines().filter(|l| !l.is_empty()).map(str::to_string));
                },
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Could not read previous hashed relay identities");
                },
            }
        }
        merged.extend(self.hashed_relays.iter().cloned());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut content = String::with_capacity(merged.len() * 41);
        for hash in &merged {
            content.push_str(hash);
            content.push('\n');
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!(total = merged.len(), new = self.hashed_relays.len(), "Wrote hashed relay identities");
        Ok(())
    }
}
