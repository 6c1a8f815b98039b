//! Structured descriptor records as JSON lines
//!
//! Every line is one JSON object with a `type` field: `consensus`, `vote`,
//! `server-descriptor`, `extra-info`, `status-entry`, `dirreq-stats` or
//! `conn-bi-direct`. Status entries are written as they are streamed, before
//! the line of the consensus that contains them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::debug;

use super::{DescriptorSink, SinkStage};
use crate::descriptor::{ParsedDescriptor, StatusEntry};

#[derive(Serialize)]
struct Typed<'r, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    record: &'r T,
}

#[derive(Serialize)]
struct StatusEntryLine<'r> {
    valid_after: DateTime<Utc>,
    #[serde(flatten)]
    entry: &'r StatusEntry,
}

pub struct RecordsWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl RecordsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open {}", self.path.display()))?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .context("Records file is not open")
    }

    fn write_line<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let writer = self.writer()?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }
}

impl DescriptorSink for RecordsWriter {
    fn name(&self) -> &'static str {
        "records"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Database
    }

    fn on_status_entry(&mut self, valid_after: DateTime<Utc>, entry: &StatusEntry) -> Result<()> {
        self.write_line(&Typed {
            kind: "status-entry",
            record: &StatusEntryLine { valid_after, entry },
        })
    }

    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()> {
        self.write_line(descriptor)?;
        if let ParsedDescriptor::ExtraInfo(record) = descriptor {
            for stats in &record.dir_req_stats {
                self.write_line(&Typed {
                    kind: "dirreq-stats",
                    record: stats,
                })?;
            }
            for stats in &record.conn_bi_direct {
                self.write_line(&Typed {
                    kind: "conn-bi-direct",
                    record: stats,
                })?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        }
        debug!(written = self.written, path = %self.path.display(), "Finished writing descriptor records");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::descriptor::{DirReqStats, ExtraInfoRecord};
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    #[test]
    fn test_writes_one_line_per_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("db/records.jsonl");
        let mut writer = RecordsWriter::new(&path);

        let entry = StatusEntry {
            nickname: "moria1".to_string(),
            relay_identity: "00".repeat(20),
            descriptor_digest: "11".repeat(20),
            published: Utc::now(),
            address: "128.31.0.34".to_string(),
            or_port: 9101,
            dir_port: 9131,
            flags: BTreeSet::from(["Running".to_string()]),
            version: None,
            bandwidth: Some(20),
            ports: None,
            raw: b"r ...\n".to_vec(),
        };
        writer.on_status_entry(Utc::now(), &entry).unwrap();

        let mut requests = BTreeMap::new();
        requests.insert("de".to_string(), 8);
        let descriptor = ParsedDescriptor::ExtraInfo(ExtraInfoRecord {
            digest: "ab".repeat(20),
            nickname: "moria1".to_string(),
            directory: "cd".repeat(20),
            published: None,
            published_time: None,
            bandwidth_history: Vec::new(),
            dir_req_stats: vec![DirReqStats {
                directory: "cd".repeat(20),
                stats_end: None,
                seconds: None,
                requests,
            }],
            conn_bi_direct: Vec::new(),
            raw: b"extra-info\n",
        });
        writer.on_descriptor(&descriptor).unwrap();
        writer.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "status-entry");
        assert_eq!(lines[0]["nickname"], "moria1");
        assert_eq!(lines[0]["flags"][0], "Running");
        assert_eq!(lines[1]["type"], "extra-info");
        assert!(lines[1].get("dir_req_stats").is_none());
        assert_eq!(lines[2]["type"], "dirreq-stats");
        assert_eq!(lines[2]["requests"]["de"], 8);
        assert_eq!(writer.written(), 3);
    }
}
