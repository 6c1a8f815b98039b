//! Run configuration
//!
//! Loaded from built-in defaults, then an optional TOML file, then
//! `COLLECTOR_` environment variables where `__` separates nested keys
//! (`COLLECTOR_TORPERF__ENABLED=true`). A `.env` file is read first.

use collector_common::{CollectorError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::history::IMPORT_HISTORY_FILE;
use crate::lock::DEFAULT_STALE_AFTER_MINUTES;
use crate::sinks::stats::HASHED_RELAYS_FILE;
use crate::torperf::watermark::WATERMARK_FILE;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_CONFIG_FILE: &str = "collector.toml";

pub const ENV_PREFIX: &str = "COLLECTOR_";

/// Local series copies modified within this window are not downloaded again
pub const DEFAULT_FRESH_THRESHOLD_MINUTES: i64 = 330;

pub const DEFAULT_CONSENSUS_MAX_AGE_HOURS: i64 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Holds the import history, merge history and statistics files
    pub stats_directory: PathBuf,
    pub lock_file: PathBuf,
    pub lock_stale_after_minutes: i64,
    pub descriptors: DescriptorsConfig,
    pub torperf: TorperfConfig,
    pub cleanup: Option<CleanupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DescriptorsConfig {
    pub enabled: bool,
    pub archives_directory: PathBuf,
    pub keep_import_history: bool,
    pub write_directory_archives: bool,
    pub directory_archives_output_directory: PathBuf,
    pub write_relay_descriptor_records: bool,
    pub records_output_file: PathBuf,
    pub collect_hashed_relays: bool,
    pub track_inventory: bool,
    pub check_consensus_health: bool,
    pub consensus_max_age_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TorperfConfig {
    pub enabled: bool,
    pub output_directory: PathBuf,
    pub sources: Vec<TorperfSource>,
    pub files: Vec<TorperfFile>,
    pub fresh_threshold_minutes: i64,
    /// Transport default when unset
    pub request_timeout_secs: Option<u64>,
}

/// A measurement host serving `.data` and `.extradata` files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorperfSource {
    pub name: String,
    /// Prefix the file names are appended to
    pub base_url: String,
}

/// One pair of series files measured with the same file size
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorperfFile {
    pub source: String,
    pub file_size: u64,
    pub data_file: String,
    pub extradata_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupConfig {
    pub directory: PathBuf,
    pub max_age_days: u64,
    /// Only files with one of these suffixes are deleted; all files when empty
    #[serde(default)]
    pub suffixes: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            stats_directory: PathBuf::from("stats"),
            lock_file: PathBuf::from("lock"),
            lock_stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            descriptors: DescriptorsConfig::default(),
            torperf: TorperfConfig::default(),
            cleanup: None,
        }
    }
}

impl Default for DescriptorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            archives_directory: PathBuf::from("archives"),
            keep_import_history: true,
            write_directory_archives: false,
            directory_archives_output_directory: PathBuf::from("directory-archive"),
            write_relay_descriptor_records: false,
            records_output_file: PathBuf::from("records/relay-descriptors.jsonl"),
            collect_hashed_relays: false,
            track_inventory: false,
            check_consensus_health: false,
            consensus_max_age_hours: DEFAULT_CONSENSUS_MAX_AGE_HOURS,
        }
    }
}

impl Default for TorperfConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_directory: PathBuf::from("torperf"),
            sources: Vec::new(),
            files: Vec::new(),
            fresh_threshold_minutes: DEFAULT_FRESH_THRESHOLD_MINUTES,
            request_timeout_secs: None,
        }
    }
}

impl CollectorConfig {
    /// Load from defaults, `path` (if it exists) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from defaults and a TOML document only
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| CollectorError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_stale_after_minutes <= 0 {
            return Err(CollectorError::Config(
                "lock_stale_after_minutes must be greater than 0".to_string(),
            ));
        }
        if self.descriptors.check_consensus_health && self.descriptors.consensus_max_age_hours <= 0 {
            return Err(CollectorError::Config(
                "descriptors.consensus_max_age_hours must be greater than 0".to_string(),
            ));
        }

        if self.torperf.enabled {
            if self.torperf.fresh_threshold_minutes <= 0 {
                return Err(CollectorError::Config(
                    "torperf.fresh_threshold_minutes must be greater than 0".to_string(),
                ));
            }
            for file in &self.torperf.files {
                if self.torperf.source_url(&file.source).is_none() {
                    return Err(CollectorError::Config(format!(
                        "torperf file {} refers to unknown source '{}'",
                        file.data_file, file.source
                    )));
                }
                if file.file_size == 0 {
                    return Err(CollectorError::Config(format!(
                        "torperf file {} must have a file size greater than 0",
                        file.data_file
                    )));
                }
            }
        }

        if let Some(cleanup) = &self.cleanup {
            if cleanup.max_age_days == 0 {
                return Err(CollectorError::Config(
                    "cleanup.max_age_days must be greater than 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn import_history_path(&self) -> PathBuf {
        self.stats_directory.join(IMPORT_HISTORY_FILE)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.stats_directory.join(WATERMARK_FILE)
    }

    pub fn hashed_relays_path(&self) -> PathBuf {
        self.stats_directory.join(HASHED_RELAYS_FILE)
    }
}

impl TorperfConfig {
    pub fn source_url(&self, name: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|source| source.name == name)
            .map(|source| source.base_url.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lock_stale_after_minutes, 55);
        assert_eq!(config.torperf.fresh_threshold_minutes, 330);
        assert_eq!(config.import_history_path(), PathBuf::from("stats/archives-import-history"));
        assert_eq!(config.watermark_path(), PathBuf::from("stats/torperf-last-merged"));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = CollectorConfig::from_toml_str(
            r#"
            stats_directory = "state"

            [descriptors]
            write_directory_archives = true

            [torperf]
            enabled = true

            [[torperf.sources]]
            name = "torperf"
            base_url = "http://torperf.example.org/"

            [[torperf.files]]
            source = "torperf"
            file_size = 51200
            data_file = "50kb.data"
            extradata_file = "50kb.extradata"
            "#,
        )
        .unwrap();

        assert_eq!(config.stats_directory, PathBuf::from("state"));
        assert!(config.descriptors.enabled);
        assert!(config.descriptors.write_directory_archives);
        assert_eq!(config.torperf.source_url("torperf"), Some("http://torperf.example.org/"));
        assert_eq!(config.torperf.files[0].file_size, 51200);
    }

    #[test]
    fn test_unknown_torperf_source_is_rejected() {
        let result = CollectorConfig::from_toml_str(
            r#"
            [torperf]
            enabled = true

            [[torperf.files]]
            source = "nowhere"
            file_size = 51200
            data_file = "50kb.data"
            extradata_file = "50kb.extradata"
            "#,
        );
        assert!(matches!(result, Err(CollectorError::Config(_))));
    }
}
