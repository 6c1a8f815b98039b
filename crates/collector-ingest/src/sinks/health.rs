//! Consensus freshness checks

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{DescriptorSink, SinkStage};
use crate::descriptor::ParsedDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthFinding {
    /// The newest consensus is older than the allowed age
    StaleConsensus { valid_after: DateTime<Utc> },
    /// A vote was published for a different period than the newest consensus
    VoteMismatch {
        authority: String,
        vote_valid_after: DateTime<Utc>,
        consensus_valid_after: DateTime<Utc>,
    },
}

pub struct ConsensusHealth {
    run_started: DateTime<Utc>,
    max_age: Duration,
    newest_consensus: Option<DateTime<Utc>>,
    votes: Vec<(String, DateTime<Utc>)>,
}

impl ConsensusHealth {
    pub fn new(run_started: DateTime<Utc>, max_age: Duration) -> Self {
        Self {
            run_started,
            max_age,
            newest_consensus: None,
            votes: Vec::new(),
        }
    }

    pub fn findings(&self) -> Vec<HealthFinding> {
        let Some(newest) = self.newest_consensus else {
            return Vec::new();
        };

        let mut findings = Vec::new();
        if newest < self.run_started - self.max_age {
            findings.push(HealthFinding::StaleConsensus { valid_after: newest });
        }
        for (authority, valid_after) in &self.votes {
            if *valid_after != newest {
                findings.push(HealthFinding::VoteMismatch {
                    authority: authority.clone(),
                    vote_valid_after: *valid_after,
                    consensus_valid_after: newest,
                });
            }
        }
        findings
    }
}

impl DescriptorSink for ConsensusHealth {
    fn name(&self) -> &'static str {
        "consensus-health"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Health
    }

    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()> {
        match descriptor {
            ParsedDescriptor::Consensus(status) => {
                if self.newest_consensus.map_or(true, |newest| status.valid_after > newest) {
                    self.newest_consensus = Some(status.valid_after);
                }
            },
            ParsedDescriptor::Vote(status) => {
                let authority = status
                    .dir_source
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                self.votes.push((authority, status.valid_after));
            },
            _ => {},
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let findings = self.findings();
        for finding in &findings {
            match finding {
                HealthFinding::StaleConsensus { valid_after } => {
                    warn!(valid_after = %valid_after, "The newest consensus is older than allowed");
                },
                HealthFinding::VoteMismatch {
                    authority,
                    vote_valid_after,
                    consensus_valid_after,
                } => {
                    warn!(
                        authority = %authority,
                        vote = %vote_valid_after,
                        consensus = %consensus_valid_after,
                        "Vote does not match the newest consensus"
                    );
                },
            }
        }
        debug!(findings = findings.len(), "Checked consensus health");
        Ok(())
    }
}
