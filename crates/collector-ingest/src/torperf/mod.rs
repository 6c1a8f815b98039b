//! Torperf measurement collection
//!
//! For every configured pair of series files:
//!
//! 1. append the new lines of the remote `.data` and `.extradata` files to
//!    the local copies ([`append`])
//! 2. if either copy grew, merge both from the last watermark on
//!    ([`merge`]) into dated `.tpf` buckets ([`bucket`])
//! 3. remember the new watermark ([`watermark`])

pub mod append;
pub mod bucket;
pub mod merge;
pub mod series;
pub mod watermark;

use anyhow::{Context, Result};
use chrono::Duration;
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{TorperfConfig, TorperfFile};
use append::{SeriesAppender, SeriesKind};
use bucket::OutputBucketCache;
use merge::{MergeContext, MergeEngine, MergeOutcome};
use watermark::WatermarkStore;

pub use append::AppendOutcome;

/// Totals of one collection run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorperfSummary {
    pub files_appended: usize,
    pub merges: usize,
    pub rows: usize,
    pub new_records: usize,
}

pub struct TorperfDownloader {
    config: TorperfConfig,
    watermark_path: PathBuf,
    appender: SeriesAppender,
}

impl TorperfDownloader {
    pub fn new(config: TorperfConfig, watermark_path: impl Into<PathBuf>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!("collector-ingest/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        let appender = SeriesAppender::new(client, Duration::minutes(config.fresh_threshold_minutes));

        Ok(Self {
            config,
            watermark_path: watermark_path.into(),
            appender,
        })
    }

    /// Download, append and merge every configured file pair
    pub async fn run(&self) -> Result<TorperfSummary> {
        let output_directory = &self.config.output_directory;
        fs::create_dir_all(output_directory)
            .with_context(|| format!("Failed to create {}", output_directory.display()))?;

        let mut watermarks = WatermarkStore::load(&self.watermark_path);
        let mut buckets = OutputBucketCache::new(output_directory);
        let mut summary = TorperfSummary::default();

        for file in &self.config.files {
            self.download_and_merge(file, &mut watermarks, &mut buckets, &mut summary)
                .await;
        }

        if let Err(e) = watermarks.persist() {
            warn!(
                path = %watermarks.path().display(),
                error = %e,
                "Could not write merge history. The next run may merge files from the start."
            );
        }

        info!(
            appended = summary.files_appended,
            merges = summary.merges,
            rows = summary.rows,
            new_records = summary.new_records,
            "Finished collecting Torperf measurements"
        );
        Ok(summary)
    }

    async fn append(&self, file: &TorperfFile, base_url: &str, name: &str, kind: SeriesKind) -> bool {
        let url = format!("{}{}", base_url, name);
        let output = self.config.output_directory.join(format!("{}-{}", file.source, name));
        match self.appender.download_and_append(&url, &output, kind).await {
            Ok(outcome) => outcome.appended(),
            Err(e) => {
                warn!(url = %url, error = %e, "Failed downloading and/or appending series file");
                false
            },
        }
    }

    async fn download_and_merge(
        &self,
        file: &TorperfFile,
        watermarks: &mut WatermarkStore,
        buckets: &mut OutputBucketCache,
        summary: &mut TorperfSummary,
    ) {
        let Some(base_url) = self.config.source_url(&file.source) else {
            warn!(source = %file.source, "No base URL configured for Torperf source. Skipping.");
            return;
        };

        let appended_data = self.append(file, base_url, &file.data_file, SeriesKind::Data).await;
        let appended_extradata = self
            .append(file, base_url, &file.extradata_file, SeriesKind::Extradata)
            .await;
        summary.files_appended += usize::from(appended_data) + usize::from(appended_extradata);

        if !appended_data && !appended_extradata {
            debug!(source = %file.source, data_file = %file.data_file, "Nothing new to merge");
            return;
        }

        let data_name = format!("{}-{}", file.source, file.data_file);
        let data_path = self.config.output_directory.join(&data_name);
        let extradata_path = self
            .config
            .output_directory
            .join(format!("{}-{}", file.source, file.extradata_file));

        let skip_until = watermarks.get(&data_name).map(str::to_string);
        let mut ctx = MergeContext::new(file.source.clone(), file.file_size, skip_until, buckets);
        match merge_files(&data_path, &extradata_path, &mut ctx) {
            Ok(Some(outcome)) => {
                summary.merges += 1;
                summary.rows += outcome.rows;
                summary.new_records += outcome.new_records;
                if let Some(watermark) = outcome.watermark {
                    watermarks.set(data_name, watermark);
                }
            },
            Ok(None) => {},
            Err(e) => {
                warn!(
                    data = %data_path.display(),
                    extradata = %extradata_path.display(),
                    error = %e,
                    "Failed merging series files"
                );
            },
        }
    }
}

/// Merge a local `.data` and `.extradata` copy
///
/// Returns `Ok(None)` when one of the two files is missing.
pub fn merge_files(data_path: &Path, extradata_path: &Path, ctx: &mut MergeContext<'_>) -> Result<Option<MergeOutcome>> {
    if !data_path.exists() || !extradata_path.exists() {
        warn!(
            data = %data_path.display(),
            extradata = %extradata_path.display(),
            "Series file is missing. Not merging."
        );
        return Ok(None);
    }
    debug!(data = %data_path.display(), extradata = %extradata_path.display(), "Merging into .tpf format");

    let data = fs::read(data_path).with_context(|| format!("Failed to read {}", data_path.display()))?;
    let extradata = fs::read(extradata_path)
        .with_context(|| format!("Failed to read {}", extradata_path.display()))?;
    let data = String::from_utf8_lossy(&data);
    let extradata = String::from_utf8_lossy(&extradata);

    Ok(Some(MergeEngine::merge(data.lines(), extradata.lines(), ctx)))
}
