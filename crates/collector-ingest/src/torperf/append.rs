//! Appending freshly downloaded series to their local copies
//!
//! Remote series files are truncated at their start over time, so they are
//! not simply copied. The last timestamp line of the local copy is searched
//! in the download and only the lines following it are appended. When the
//! download no longer contains that line, nothing is appended: a stale file
//! can be repaired by a later run, a gap cannot.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Data,
    Extradata,
}

impl SeriesKind {
    pub fn extension(&self) -> &'static str {
        match self {
            SeriesKind::Data => ".data",
            SeriesKind::Extradata => ".extradata",
        }
    }

    /// Lines that mark a completed measurement
    pub fn is_timestamp_line(&self, line: &str) -> bool {
        match self {
            SeriesKind::Data => !line.is_empty(),
            SeriesKind::Extradata => line.contains(" LAUNCH"),
        }
    }

    /// Seconds since the epoch of a timestamp line
    pub fn timestamp_of(&self, line: &str) -> Option<i64> {
        let seconds = match self {
            SeriesKind::Data => line.split(' ').next()?,
            SeriesKind::Extradata => {
                let launch = line.split(' ').find_map(|token| token.strip_prefix("LAUNCH="))?;
                launch.split('.').next()?
            },
        };
        seconds.parse().ok()
    }
}

/// Position of the last timestamp line in a local copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighWaterMark {
    pub line: Option<String>,
    /// Lines in the local copy after `line`
    pub lines_after: usize,
}

impl HighWaterMark {
    pub fn scan(content: &str, kind: SeriesKind) -> Self {
        let mut mark = Self::default();
        for line in content.lines() {
            if kind.is_timestamp_line(line) {
                mark.line = Some(line.to_string());
                mark.lines_after = 0;
            } else {
                mark.lines_after += 1;
            }
        }
        mark
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendPlan<'r> {
    /// Lines to append, and the last timestamp line afterwards
    Append {
        lines: Vec<&'r str>,
        last_timestamp_line: Option<String>,
    },
    /// The download does not contain the local high-water-mark line
    MarkNotFound,
}

/// Decide which remote lines continue the local copy
///
/// Lines up to and including the mark are skipped, as are as many lines
/// after it as the local copy already holds.
pub fn lines_to_append<'r>(remote: &'r str, mark: &HighWaterMark, kind: SeriesKind) -> AppendPlan<'r> {
    let mut copying = mark.line.is_none();
    let mut to_skip = mark.lines_after;
    let mut last_timestamp_line = mark.line.clone();
    let mut lines = Vec::new();

    for line in remote.lines() {
        if copying && to_skip == 0 {
            if kind.is_timestamp_line(line) {
                last_timestamp_line = Some(line.to_string());
            }
            lines.push(line);
        } else if copying {
            to_skip -= 1;
        } else if mark.line.as_deref() == Some(line) {
            copying = true;
        }
    }

    if copying {
        AppendPlan::Append {
            lines,
            last_timestamp_line,
        }
    } else {
        AppendPlan::MarkNotFound
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The local copy was modified recently; no download was made
    Fresh,
    Appended { lines: usize },
    MarkNotFound,
}

impl AppendOutcome {
    pub fn appended(&self) -> bool {
        matches!(self, AppendOutcome::Appended { .. })
    }
}

pub struct SeriesAppender {
    client: Client,
    fresh_threshold: Duration,
}

impl SeriesAppender {
    pub fn new(client: Client, fresh_threshold: Duration) -> Self {
        Self {
            client,
            fresh_threshold,
        }
    }

    fn is_fresh(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let modified: DateTime<Utc> = fs::metadata(path)?.modified()?.into();
        Ok(modified > Utc::now() - self.fresh_threshold)
    }

    /// Download `url` and append its new lines to `output`
    pub async fn download_and_append(&self, url: &str, output: &Path, kind: SeriesKind) -> Result<AppendOutcome> {
        if self.is_fresh(output)? {
            debug!(path = %output.display(), "Local copy is fresh. Skipping download.");
            return Ok(AppendOutcome::Fresh);
        }

        let mark = if output.exists() {
            let content = fs::read_to_string(output)
                .with_context(|| format!("Failed reading {} to find the first line to append", output.display()))?;
            HighWaterMark::scan(&content, kind)
        } else {
            HighWaterMark::default()
        };

        debug!(url = %url, path = %output.display(), kind = kind.extension(), "Downloading series file");
        let remote = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?
            .error_for_status()
            .with_context(|| format!("Failed to download {}", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?;

        let (lines, last_timestamp_line) = match lines_to_append(&remote, &mark, kind) {
            AppendPlan::Append {
                lines,
                last_timestamp_line,
            } => (lines, last_timestamp_line),
            AppendPlan::MarkNotFound => {
                warn!(
                    path = %output.display(),
                    url = %url,
                    "The last timestamp line is not contained in the new download. Cannot append new lines without possibly leaving a gap. Skipping."
                );
                return Ok(AppendOutcome::MarkNotFound);
            },
        };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output)
            .with_context(|| format!("Failed to open {}", output.display()))?;
        let mut buffer = String::new();
        for line in &lines {
            buffer.push_str(line);
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())
            .with_context(|| format!("Failed to append to {}", output.display()))?;

        self.warn_if_stale(output, kind, last_timestamp_line.as_deref());
        Ok(AppendOutcome::Appended { lines: lines.len() })
    }

    fn warn_if_stale(&self, output: &Path, kind: SeriesKind, last_timestamp_line: Option<&str>) {
        let Some(line) = last_timestamp_line else {
            warn!(path = %output.display(), "File doesn't contain any timestamp lines. Unable to check whether it is stale.");
            return;
        };
        let Some(seconds) = kind.timestamp_of(line) else {
            warn!(path = %output.display(), line = %line, "Could not read the last timestamp.");
            return;
        };
        let threshold = Utc::now() - self.fresh_threshold;
        if DateTime::from_timestamp(seconds, 0).is_some_and(|last| last < threshold) {
            warn!(
                path = %output.display(),
                last_timestamp = seconds,
                minutes = self.fresh_threshold.num_minutes(),
                "The last timestamp is older than the freshness window"
            );
        }
    }
}
