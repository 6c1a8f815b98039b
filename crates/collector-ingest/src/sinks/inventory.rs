//! Inventory of referenced versus parsed descriptors
//!
//! Consensuses reference votes through their dir sources, status entries
//! reference server descriptors, and server descriptors reference extra-info
//! descriptors. The inventory reports how many referenced documents were
//! not seen during the run.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use super::{DescriptorSink, SinkStage};
use crate::descriptor::ParsedDescriptor;

/// Counts of referenced documents that were never parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InventoryReport {
    pub missing_votes: usize,
    pub missing_server_descriptors: usize,
    pub missing_extra_infos: usize,
}

#[derive(Default)]
pub struct DescriptorInventory {
    /// valid-after -> confirmed dir sources
    consensuses: BTreeMap<String, BTreeSet<String>>,
    /// (valid-after, authority fingerprint)
    votes: BTreeSet<(String, String)>,
    referenced_server_descriptors: BTreeSet<String>,
    parsed_server_descriptors: BTreeSet<String>,
    referenced_extra_infos: BTreeSet<String>,
    parsed_extra_infos: BTreeSet<String>,
}

impl DescriptorInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn reference_server_descriptors(&mut self, referenced: &BTreeSet<String>) {
        for reference in referenced {
            // <published>,<identity>,<digest>
            if let Some(digest) = reference.rsplit(',').next() {
                self.referenced_server_descriptors.insert(digest.to_string());
            }
        }
    }

    pub fn report(&self) -> InventoryReport {
        let missing_votes = self
            .consensuses
            .iter()
            .map(|(valid_after, dir_sources)| {
                dir_sources
                    .iter()
                    .filter(|authority| {
                        !self
                            .votes
                            .contains(&(valid_after.clone(), authority.to_string()))
                    })
                    .count()
            })
            .sum();

        InventoryReport {
            missing_votes,
            missing_server_descriptors: self
                .referenced_server_descriptors
                .difference(&self.parsed_server_descriptors)
                .count(),
            missing_extra_infos: self
                .referenced_extra_infos
                .difference(&self.parsed_extra_infos)
                .count(),
        }
    }
}

impl DescriptorSink for DescriptorInventory {
    fn name(&self) -> &'static str {
        "inventory"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Inventory
    }

    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()> {
        match descriptor {
            ParsedDescriptor::Consensus(status) => {
                self.consensuses
                    .entry(status.valid_after_time.clone())
                    .or_default()
                    .extend(status.dir_sources.iter().cloned());
                self.reference_server_descriptors(&status.referenced_descriptors);
            },
            ParsedDescriptor::Vote(status) => {
                if let Some(fingerprint) = &status.fingerprint {
                    self.votes
                        .insert((status.valid_after_time.clone(), fingerprint.clone()));
                }
                self.reference_server_descriptors(&status.referenced_descriptors);
            },
            ParsedDescriptor::ServerDescriptor(record) => {
                self.parsed_server_descriptors.insert(record.digest.clone());
                if let Some(extra_info_digest) = &record.extra_info_digest {
                    self.referenced_extra_infos.insert(extra_info_digest.clone());
                }
            },
            ParsedDescriptor::ExtraInfo(record) => {
                self.parsed_extra_infos.insert(record.digest.clone());
            },
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let report = self.report();
        info!(
            consensuses = self.consensuses.len(),
            votes = self.votes.len(),
            server_descriptors = self.parsed_server_descriptors.len(),
            extra_infos = self.parsed_extra_infos.len(),
            missing_votes = report.missing_votes,
            missing_server_descriptors = report.missing_server_descriptors,
            missing_extra_infos = report.missing_extra_infos,
            "Descriptor inventory"
        );
        Ok(())
    }
}
