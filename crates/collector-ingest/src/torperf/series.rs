//! Line decoders for the two measurement series
//!
//! A `.data` line is a fixed sequence of space-separated tokens; timestamps
//! occupy two tokens each (whole seconds, microseconds). An `.extradata`
//! line is a sequence of `KEY=value` tokens.

use std::collections::BTreeMap;

/// Field name to value, ordered by field name
pub type SeriesRecord = BTreeMap<String, String>;

/// Token offset of each timestamp in a `.data` line
pub const DATA_TIMESTAMP_FIELDS: [(usize, &str); 18] = [
    (0, "START"),
    (2, "SOCKET"),
    (4, "CONNECT"),
    (6, "NEGOTIATE"),
    (8, "REQUEST"),
    (10, "RESPONSE"),
    (12, "DATAREQUEST"),
    (14, "DATARESPONSE"),
    (16, "DATACOMPLETE"),
    (21, "DATAPERC10"),
    (23, "DATAPERC20"),
    (25, "DATAPERC30"),
    (27, "DATAPERC40"),
    (29, "DATAPERC50"),
    (31, "DATAPERC60"),
    (33, "DATAPERC70"),
    (35, "DATAPERC80"),
    (37, "DATAPERC90"),
];

const WRITEBYTES: usize = 18;
const READBYTES: usize = 19;
const DIDTIMEOUT: usize = 20;

/// Shortest valid `.data` line, through READBYTES
pub const MIN_DATA_TOKENS: usize = 20;

/// Reasons that may follow `STREAM_FAIL_REASONS=<reason>` as bare tokens
pub const CONTINUED_FAIL_REASONS: [&str; 4] = ["MISC", "EXITPOLICY", "RESOURCELIMIT", "RESOLVEFAILED"];

/// Decode one `.data` line
///
/// Timestamps are rendered as `<seconds>.<hundredths>`, the microseconds
/// truncated. Returns `None` for lines that are too short or contain
/// non-numeric timestamp tokens.
pub fn parse_data_line(line: &str) -> Option<SeriesRecord> {
    let parts: Vec<&str> = line.trim().split(' ').collect();
    if line.is_empty() || parts.len() < MIN_DATA_TOKENS {
        return None;
    }

    let mut data = SeriesRecord::new();
    for (i, key) in DATA_TIMESTAMP_FIELDS {
        if parts.len() > i + 1 {
            let seconds: u64 = parts[i].parse().ok()?;
            let micros: u32 = parts[i + 1].parse().ok()?;
            data.insert(key.to_string(), format!("{}.{:02}", seconds, micros / 10_000));
        }
    }
    data.insert("WRITEBYTES".to_string(), parts[WRITEBYTES].to_string());
    data.insert("READBYTES".to_string(), parts[READBYTES].to_string());
    if let Some(did_timeout) = parts.get(DIDTIMEOUT) {
        data.insert("DIDTIMEOUT".to_string(), did_timeout.to_string());
    }
    Some(data)
}

/// Decode the `KEY=value` tokens of one `.extradata` line
///
/// Floats with a single fractional digit get a trailing `0`. A bare token
/// is only accepted as a continued `STREAM_FAIL_REASONS` value; any other
/// malformed token invalidates the line.
pub fn parse_extradata_tokens(line: &str) -> Option<SeriesRecord> {
    let mut extradata = SeriesRecord::new();
    let mut previous_key: Option<&str> = None;

    for part in line.split(' ') {
        let pieces: Vec<&str> = part.split('=').collect();
        match pieces.as_slice() {
            [key, value] => {
                let mut value = value.to_string();
                if value.rfind('.').is_some_and(|dot| dot + 2 == value.len()) {
                    value.push('0');
                }
                extradata.insert(key.to_string(), value);
                previous_key = Some(key);
            },
            [bare] => {
                let key = previous_key?;
                if key != "STREAM_FAIL_REASONS" || !CONTINUED_FAIL_REASONS.contains(bare) {
                    return None;
                }
                let reasons = extradata.get_mut(key)?;
                reasons.push(':');
                reasons.push_str(bare);
            },
            _ => return None,
        }
    }
    Some(extradata)
}

/// Classification of one `.extradata` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtradataLine {
    Empty,
    BuildTimeoutSet,
    /// `ok ...` and `error ...` lines of the old format
    OldFormat,
    Malformed,
    MissingUsedAt,
    Measurement { used_at: String, record: SeriesRecord },
}

impl ExtradataLine {
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            return ExtradataLine::Empty;
        }
        if line.starts_with("BUILDTIMEOUT_SET ") {
            return ExtradataLine::BuildTimeoutSet;
        }
        if line.starts_with("ok ") || line.starts_with("error ") {
            return ExtradataLine::OldFormat;
        }
        let Some(record) = parse_extradata_tokens(line) else {
            return ExtradataLine::Malformed;
        };
        match record.get("USED_AT") {
            Some(used_at) => ExtradataLine::Measurement {
                used_at: used_at.clone(),
                record,
            },
            None => ExtradataLine::MissingUsedAt,
        }
    }
}
