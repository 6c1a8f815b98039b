//! Join of the `.data` and `.extradata` series
//!
//! Both series are read forward once. For every `.data` row the extradata
//! cursor advances until it finds a measurement whose USED_AT lies within
//! [`JOIN_TOLERANCE_SECS`] of the row's DATACOMPLETE; a measurement ahead of
//! the row is kept for the next row, one behind it is dropped. Rows without a
//! matching measurement are written from their own fields.

use std::collections::BTreeMap;
use std::iter::Peekable;
use tracing::{trace, warn};

use super::bucket::{InsertOutcome, OutputBucketCache, OutputBucketKey};
use super::series::{parse_data_line, ExtradataLine, SeriesRecord};

pub const JOIN_TOLERANCE_SECS: f64 = 1.0;

/// Everything one merge consults and writes to
pub struct MergeContext<'c> {
    pub source: String,
    pub file_size: u64,
    /// Rows before this timestamp were merged in an earlier run
    pub skip_until: Option<String>,
    pub buckets: &'c mut OutputBucketCache,
}

impl<'c> MergeContext<'c> {
    pub fn new(
        source: impl Into<String>,
        file_size: u64,
        skip_until: Option<String>,
        buckets: &'c mut OutputBucketCache,
    ) -> Self {
        Self {
            source: source.into(),
            file_size,
            skip_until,
            buckets,
        }
    }

    fn already_merged(&self, timestamp: &str) -> bool {
        self.skip_until
            .as_deref()
            .is_some_and(|skip_until| timestamp < skip_until)
    }

    fn fixed_fields(&self) -> [(String, String); 2] {
        [
            ("SOURCE".to_string(), self.source.clone()),
            ("FILESIZE".to_string(), self.file_size.to_string()),
        ]
    }
}

/// Counts and resume point of one merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Rows written to a bucket, with or without extradata
    pub rows: usize,
    /// Rows joined with an extradata measurement
    pub joined: usize,
    /// Rows whose START was not in the bucket before
    pub new_records: usize,
    /// Resume point for the next run
    pub watermark: Option<String>,
}

fn keep_max(current: &mut Option<String>, candidate: &str) {
    if current.as_deref().map_or(true, |max| candidate > max) {
        *current = Some(candidate.to_string());
    }
}

/// Serialize a merged row as sorted `KEY=value` tokens
pub fn format_record(record: &SeriesRecord) -> String {
    record
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct MergeEngine;

impl MergeEngine {
    /// Merge two series into the context's buckets and flush the last bucket
    pub fn merge<'d, 'e>(
        data_lines: impl Iterator<Item = &'d str>,
        extradata_lines: impl Iterator<Item = &'e str>,
        ctx: &mut MergeContext<'_>,
    ) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut extradata = extradata_lines.peekable();
        let mut max_data_complete: Option<String> = None;
        let mut max_used_at: Option<String> = None;

        for (index, line) in data_lines.enumerate() {
            let line_number = index + 1;
            if line.is_empty() {
                trace!(line_number, "Skipping empty .data line");
                continue;
            }
            let Some(data) = parse_data_line(line) else {
                trace!(line_number, line = %line, "Skipping illegal .data line");
                continue;
            };
            let (Some(data_complete), Some(start)) = (data.get("DATACOMPLETE"), data.get("START")) else {
                continue;
            };
            let Ok(data_complete_secs) = data_complete.parse::<f64>() else {
                continue;
            };
            if ctx.already_merged(data_complete) {
                trace!(line_number, "Skipping .data line which was processed before");
                continue;
            }
            keep_max(&mut max_data_complete, data_complete);

            let matched = Self::find_extradata(&mut extradata, data_complete_secs, ctx, &mut max_used_at);

            let mut merged = BTreeMap::new();
            if let Some(extradata) = &matched {
                merged.extend(extradata.clone());
                outcome.joined += 1;
            }
            merged.extend(data.clone());
            merged.extend(ctx.fixed_fields());

            let inserted = OutputBucketKey::for_start(&ctx.source, ctx.file_size, start)
                .and_then(|key| ctx.buckets.insert(key, start, format_record(&merged)));
            match inserted {
                Ok(result) => {
                    outcome.rows += 1;
                    if result == InsertOutcome::Added {
                        outcome.new_records += 1;
                    }
                },
                Err(e) => {
                    warn!(line_number, error = %e, "Error writing output line. Aborting merge.");
                    break;
                },
            }
        }

        if let Err(e) = ctx.buckets.flush() {
            warn!(error = %e, "Could not write output bucket");
        }

        outcome.watermark = match (max_data_complete, max_used_at) {
            (None, used_at) => used_at,
            (data_complete, None) => data_complete,
            (Some(data_complete), Some(used_at)) => Some(data_complete.min(used_at)),
        };
        outcome
    }

    /// Advance the extradata cursor to the measurement matching a row
    fn find_extradata<'e>(
        extradata: &mut Peekable<impl Iterator<Item = &'e str>>,
        data_complete_secs: f64,
        ctx: &MergeContext<'_>,
        max_used_at: &mut Option<String>,
    ) -> Option<SeriesRecord> {
        while let Some(&line) = extradata.peek() {
            let (used_at, record) = match ExtradataLine::parse(line) {
                ExtradataLine::Measurement { used_at, record } => (used_at, record),
                skipped => {
                    trace!(kind = ?skipped, line = %line, "Skipping .extradata line");
                    extradata.next();
                    continue;
                },
            };
            let Ok(used_at_secs) = used_at.parse::<f64>() else {
                trace!(line = %line, "Skipping .extradata line with invalid USED_AT");
                extradata.next();
                continue;
            };
            if ctx.already_merged(&used_at) {
                trace!("Skipping .extradata line which was processed before");
                extradata.next();
                continue;
            }
            keep_max(max_used_at, &used_at);

            if (used_at_secs - data_complete_secs).abs() <= JOIN_TOLERANCE_SECS {
                extradata.next();
                return Some(record);
            } else if used_at_secs > data_complete_secs {
                trace!("Comparing .extradata line to the next .data line");
                return None;
            } else {
                trace!("Skipping .extradata line which is too old to be merged");
                extradata.next();
            }
        }
        None
    }
}
