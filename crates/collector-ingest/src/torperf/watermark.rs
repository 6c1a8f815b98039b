//! Per-file resume points of the merge
//!
//! Stored as `<data file name> <timestamp>` lines. Timestamps are kept as
//! the strings the merge produced; they are compared lexicographically.

use collector_common::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const WATERMARK_FILE: &str = "torperf-last-merged";

#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
    marks: BTreeMap<String, String>,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            marks: BTreeMap::new(),
        }
    }

    /// Load the watermarks at `path`
    ///
    /// Any invalid line discards the whole history, so every file is merged
    /// from the start again.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        if !store.path.exists() {
            return store;
        }
        let content = match fs::read_to_string(&store.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    path = %store.path.display(),
                    error = %e,
                    "Could not read merge history. Ignoring past history of merging .data and .extradata files."
                );
                return store;
            },
        };

        for line in content.lines() {
            match parse_line(line) {
                Some((name, timestamp)) => {
                    store.marks.insert(name.to_string(), timestamp.to_string());
                },
                None => {
                    warn!(
                        path = %store.path.display(),
                        line = %line,
                        "Invalid merge history line. Ignoring past history of merging .data and .extradata files."
                    );
                    store.marks.clear();
                    break;
                },
            }
        }
        debug!(path = %store.path.display(), entries = store.marks.len(), "Loaded merge history");
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.marks.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, timestamp: impl Into<String>) {
        self.marks.insert(name.into(), timestamp.into());
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content: String = self
            .marks
            .iter()
            .map(|(name, timestamp)| format!("{} {}\n", name, timestamp))
            .collect();
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = line.split(' ').collect();
    match parts.as_slice() {
        [name, timestamp] if timestamp.parse::<f64>().is_ok() => Some((*name, *timestamp)),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stats").join(WATERMARK_FILE);

        let mut store = WatermarkStore::load(&path);
        assert!(store.is_empty());
        store.set("torperf-50kb.data", "1330605006.99");
        store.set("moria-50kb.data", "1330600000.00");
        store.persist().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "moria-50kb.data 1330600000.00\ntorperf-50kb.data 1330605006.99\n"
        );
        let reloaded = WatermarkStore::load(&path);
        assert_eq!(reloaded.get("torperf-50kb.data"), Some("1330605006.99"));
    }

    #[test]
    fn test_invalid_line_discards_history() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(WATERMARK_FILE);
        fs::write(&path, "a.data 1.00\nb.data yesterday\nc.data 3.00\n").unwrap();

        let store = WatermarkStore::load(&path);
        assert!(store.is_empty());
        assert_eq!(store.get("a.data"), None);
    }
}
