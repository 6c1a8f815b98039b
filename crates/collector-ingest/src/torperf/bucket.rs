//! Dated output buckets of merged measurements
//!
//! Merged lines are grouped by (source, file size, UTC date of START). One
//! bucket is held at a time; switching to another bucket writes the current
//! one to `<root>/<yyyy>/<mm>/<dd>/<source>-<size>-<yyyy-mm-dd>.tpf`. A bucket
//! file that already exists is read back first, so its lines are kept.

use chrono::{DateTime, NaiveDate};
use collector_common::{CollectorError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

pub const TPF_HEADER: &str = "@type torperf 1.0";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputBucketKey {
    pub source: String,
    pub file_size: u64,
    pub date: NaiveDate,
}

impl OutputBucketKey {
    /// Key of a record starting at `start` (`<seconds>.<hundredths>`)
    pub fn for_start(source: &str, file_size: u64, start: &str) -> Result<Self> {
        let seconds = start.split('.').next().unwrap_or_default();
        let seconds: i64 = seconds
            .parse()
            .map_err(|_| CollectorError::Parse(format!("Invalid START value '{}'", start)))?;
        let date = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| CollectorError::Parse(format!("START value '{}' is out of range", start)))?
            .date_naive();
        Ok(Self {
            source: source.to_string(),
            file_size,
            date,
        })
    }

    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.date.format("%Y/%m/%d").to_string()).join(format!(
            "{}-{}-{}.tpf",
            self.source,
            self.file_size,
            self.date.format("%Y-%m-%d")
        ))
    }
}

/// Effect of one insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    /// Replaced a shorter line with the same START
    Replaced,
    /// An existing line at least as long was kept
    Kept,
}

#[derive(Debug)]
struct OutputBucket {
    key: OutputBucketKey,
    lines: BTreeMap<String, String>,
}

impl OutputBucket {
    fn insert(&mut self, start: &str, line: String) -> InsertOutcome {
        match self.lines.get(start) {
            None => {
                self.lines.insert(start.to_string(), line);
                InsertOutcome::Added
            },
            Some(existing) if line.len() > existing.len() => {
                self.lines.insert(start.to_string(), line);
                InsertOutcome::Replaced
            },
            Some(_) => InsertOutcome::Kept,
        }
    }
}

/// Extract the START value of a `.tpf` line
fn start_of(line: &str) -> Option<&str> {
    line.split(' ').find_map(|token| token.strip_prefix("START="))
}

pub struct OutputBucketCache {
    root: PathBuf,
    current: Option<OutputBucket>,
    flushed: usize,
}

impl OutputBucketCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: None,
            flushed: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of bucket files written so far
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    pub fn current_key(&self) -> Option<&OutputBucketKey> {
        self.current.as_ref().map(|bucket| &bucket.key)
    }

    /// Insert a serialized line whose START value is `start`
    ///
    /// Of two lines with the same START the longer one is kept.
    pub fn insert(&mut self, key: OutputBucketKey, start: &str, line: String) -> Result<InsertOutcome> {
        if self.current.as_ref().map(|bucket| &bucket.key) != Some(&key) {
            self.flush()?;
            self.current = Some(self.load(key)?);
        }
        match self.current.as_mut() {
            Some(bucket) => Ok(bucket.insert(start, line)),
            None => Err(CollectorError::Parse("No current output bucket".to_string())),
        }
    }

    fn load(&self, key: OutputBucketKey) -> Result<OutputBucket> {
        let path = key.path(&self.root);
        let mut bucket = OutputBucket {
            key,
            lines: BTreeMap::new(),
        };
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                if line.starts_with("@type ") {
                    continue;
                }
                if let Some(start) = start_of(line) {
                    bucket.lines.insert(start.to_string(), line.to_string());
                }
            }
            trace!(path = %path.display(), lines = bucket.lines.len(), "Loaded existing output bucket");
        }
        Ok(bucket)
    }

    /// Write the current bucket, header first and lines ordered by START
    pub fn flush(&mut self) -> Result<()> {
        let Some(bucket) = self.current.take() else {
            return Ok(());
        };
        let path = bucket.key.path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = String::from(TPF_HEADER);
        content.push('\n');
        for line in bucket.lines.values() {
            content.push_str(line);
            content.push('\n');
        }
        fs::write(&path, content)?;
        self.flushed += 1;
        debug!(path = %path.display(), lines = bucket.lines.len(), "Wrote output bucket");
        Ok(())
    }
}
