//! Stage sequencing for one collector run

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::time::SystemTime;
use tracing::{info, warn};

use crate::archive_reader::{ArchiveReader, ImportSummary};
use crate::clean;
use crate::config::{CleanupConfig, CollectorConfig};
use crate::descriptor::DescriptorParser;
use crate::history::ImportHistoryLedger;
use crate::lock::RunLock;
use crate::sinks::{
    ArchiveWriter, ConsensusHealth, ConsumerFanout, DescriptorInventory, HashedRelayStats, RecordsWriter,
};
use crate::torperf::{TorperfDownloader, TorperfSummary};

/// Stages a run can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Descriptors,
    Torperf,
    Clean,
}

/// Register one sink per enabled descriptor consumer
pub fn build_fanout(config: &CollectorConfig, run_started: DateTime<Utc>) -> ConsumerFanout {
    let descriptors = &config.descriptors;
    let mut fanout = ConsumerFanout::new();

    if descriptors.write_directory_archives {
        fanout.register(Box::new(ArchiveWriter::new(
            &descriptors.directory_archives_output_directory,
        )));
    }
    if descriptors.write_relay_descriptor_records {
        fanout.register(Box::new(RecordsWriter::new(&descriptors.records_output_file)));
    }
    if descriptors.collect_hashed_relays {
        fanout.register(Box::new(HashedRelayStats::new(config.hashed_relays_path())));
    }
    if descriptors.track_inventory {
        fanout.register(Box::new(DescriptorInventory::new()));
    }
    if descriptors.check_consensus_health {
        fanout.register(Box::new(ConsensusHealth::new(
            run_started,
            Duration::hours(descriptors.consensus_max_age_hours),
        )));
    }
    fanout
}

/// Import every new descriptor file below the archives directory
pub fn run_descriptors(config: &CollectorConfig) -> ImportSummary {
    let descriptors = &config.descriptors;
    let mut fanout = build_fanout(config, Utc::now());
    info!(sinks = ?fanout.sink_names(), "Importing relay descriptors");

    let mut ledger = descriptors
        .keep_import_history
        .then(|| ImportHistoryLedger::load(config.import_history_path()));

    let reader = ArchiveReader::new(&descriptors.archives_directory);
    let summary = reader.import(&DescriptorParser::new(), &mut fanout, ledger.as_mut());

    let failures = fanout.finish();
    if failures > 0 {
        warn!(failures, "Some sinks could not persist their state");
    }
    if let Some(ledger) = &ledger {
        if let Err(e) = ledger.persist() {
            warn!(path = %ledger.path().display(), error = %e, "Could not write import history");
        }
    }
    summary
}

pub async fn run_torperf(config: &CollectorConfig) -> Result<TorperfSummary> {
    let downloader = TorperfDownloader::new(config.torperf.clone(), config.watermark_path())?;
    downloader.run().await
}

pub fn run_cleanup(cleanup: &CleanupConfig) -> Result<usize> {
    let max_age = std::time::Duration::from_secs(cleanup.max_age_days * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let deleted = if cleanup.suffixes.is_empty() {
        clean::clean_dir(&cleanup.directory, cutoff)
    } else {
        let endings: Vec<&str> = cleanup.suffixes.iter().map(String::as_str).collect();
        clean::clean_dir_pattern(&cleanup.directory, cutoff, &endings)
    }
    .with_context(|| format!("Failed to clean {}", cleanup.directory.display()))?;

    info!(dir = %cleanup.directory.display(), deleted, "Cleaned up old files");
    Ok(deleted)
}

/// Run `stages` under the run lock
///
/// Fails without running anything when another run holds the lock. A failing
/// stage is logged and does not keep later stages from running.
pub async fn run_stages(config: &CollectorConfig, stages: &[Stage]) -> Result<()> {
    let lock = RunLock::new(&config.lock_file, Duration::minutes(config.lock_stale_after_minutes));
    lock.acquire().context("Another collector run is in progress")?;

    for stage in stages {
        match stage {
            Stage::Descriptors => {
                run_descriptors(config);
            },
            Stage::Torperf => {
                if let Err(e) = run_torperf(config).await {
                    warn!(error = %e, "Torperf collection failed");
                }
            },
            Stage::Clean => match &config.cleanup {
                Some(cleanup) => {
                    if let Err(e) = run_cleanup(cleanup) {
                        warn!(error = %e, "Cleanup failed");
                    }
                },
                None => info!("No cleanup configured"),
            },
        }
    }

    lock.release().context("Failed to release the run lock")?;
    Ok(())
}

/// Stages enabled in `config`, in run order
pub fn enabled_stages(config: &CollectorConfig) -> Vec<Stage> {
    let mut stages = Vec::new();
    if config.descriptors.enabled {
        stages.push(Stage::Descriptors);
    }
    if config.torperf.enabled {
        stages.push(Stage::Torperf);
    }
    if config.cleanup.is_some() {
        stages.push(Stage::Clean);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_has_only_enabled_sinks() {
        let mut config = CollectorConfig::default();
        assert!(build_fanout(&config, Utc::now()).is_empty());

        config.descriptors.check_consensus_health = true;
        config.descriptors.write_directory_archives = true;
        config.descriptors.track_inventory = true;
        let fanout = build_fanout(&config, Utc::now());
        assert_eq!(fanout.sink_names(), vec!["archive", "inventory", "consensus-health"]);
    }

    #[test]
    fn test_enabled_stages() {
        let mut config = CollectorConfig::default();
        assert_eq!(enabled_stages(&config), vec![Stage::Descriptors]);

        config.torperf.enabled = true;
        config.descriptors.enabled = false;
        assert_eq!(enabled_stages(&config), vec![Stage::Torperf]);
    }
}
