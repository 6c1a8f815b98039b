//! Extra-info descriptor grammar
//!
//! Besides the published time and bandwidth histories, extra-info
//! descriptors carry directory request and connection direction statistics.
//! Statistics lines that cannot be understood stop or skip the statistics
//! part, but never cost the descriptor itself.

use std::collections::BTreeMap;
use tracing::warn;

use super::digest::DigestExtractor;
use super::error::{DescriptorError, Result};
use super::fields::{malformed, parse_number, parse_timestamp};
use super::kind::DocumentKind;
use super::models::{
    ConnBiDirectStats, DirReqStats, ExtraInfoRecord, DIRREQ_ROUNDING_OFFSET, DIRREQ_TOTAL_KEY,
};

const HISTORY_PREFIXES: [&str; 4] = [
    "read-history ",
    "write-history ",
    "dirreq-read-history ",
    "dirreq-write-history ",
];

/// Parse an extra-info descriptor whose first line is `extra_info_line`
pub fn parse<'a, 'l>(
    data: &'a [u8],
    extra_info_line: &str,
    lines: impl Iterator<Item = &'l str>,
) -> Result<ExtraInfoRecord<'a>> {
    let mut header = extra_info_line.split(' ').skip(1);
    let (Some(nickname), Some(directory)) = (header.next(), header.next()) else {
        return Err(malformed("extra-info", extra_info_line));
    };

    let mut record = ExtraInfoRecord {
        digest: String::new(),
        nickname: nickname.to_string(),
        directory: directory.to_lowercase(),
        published: None,
        published_time: None,
        bandwidth_history: Vec::new(),
        dir_req_stats: Vec::new(),
        conn_bi_direct: Vec::new(),
        raw: data,
    };
    let mut stats_end: Option<String> = None;
    let mut seconds: Option<u64> = None;

    for line in lines {
        if let Some(time) = line.strip_prefix("published ") {
            record.published = Some(parse_timestamp(time)?);
            record.published_time = Some(time.to_string());
        } else if HISTORY_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
            record.bandwidth_history.push(line.to_string());
        } else if line.starts_with("dirreq-stats-end ") {
            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() < 5 {
                warn!(line = %line, "Could not parse dirreq-stats-end line in descriptor. Skipping.");
                break;
            }
            stats_end = Some(format!("{} {}", parts[1], parts[2]));
            seconds = Some(parse_interval("dirreq-stats-end", parts[3])?);
        } else if let Some(observations) = line.strip_prefix("dirreq-v3-reqs ") {
            if observations.is_empty() {
                continue;
            }
            match parse_requests(observations) {
                Ok(requests) => record.dir_req_stats.push(DirReqStats {
                    directory: record.directory.clone(),
                    stats_end: stats_end.clone(),
                    seconds,
                    requests,
                }),
                Err(e) => {
                    warn!(line = %line, error = %e, "Could not parse dirreq-v3-reqs line in descriptor. Skipping.");
                    break;
                },
            }
        } else if line.starts_with("conn-bi-direct ") {
            match parse_conn_bi_direct(&record.directory, line) {
                Ok(Some(stats)) => record.conn_bi_direct.push(stats),
                Ok(None) => {
                    warn!(line = %line, "Skipping invalid conn-bi-direct stats string.");
                },
                Err(e) => {
                    warn!(line = %line, error = %e, "Number format problem in conn-bi-direct stats string. Skipping.");
                },
            }
        }
    }

    record.digest = DigestExtractor::for_kind(DocumentKind::ExtraInfoDescriptor)
        .and_then(|extractor| extractor.digest(data))
        .ok_or(DescriptorError::MissingLine("router-signature"))?;

    Ok(record)
}

/// `(86400` style interval token
fn parse_interval(keyword: &'static str, token: &str) -> Result<u64> {
    parse_number(keyword, token.get(1..).unwrap_or_default())
}

/// `cc=n,cc=n,...`, each count reduced by the rounding offset, plus a total
fn parse_requests(observations: &str) -> Result<BTreeMap<String, i64>> {
    let mut requests = BTreeMap::new();
    let mut total = 0i64;
    for observation in observations.split(',') {
        let (country, count) = observation
            .split_once('=')
            .ok_or_else(|| malformed("dirreq-v3-reqs", observation))?;
        let overflow = || DescriptorError::Number {
            keyword: "dirreq-v3-reqs",
            value: count.to_string(),
        };
        let users = parse_number::<i64>("dirreq-v3-reqs", count)?
            .checked_sub(DIRREQ_ROUNDING_OFFSET)
            .ok_or_else(overflow)?;
        total = total.checked_add(users).ok_or_else(overflow)?;
        requests.insert(country.to_string(), users);
    }
    requests.insert(DIRREQ_TOTAL_KEY.to_string(), total);
    Ok(requests)
}

/// `conn-bi-direct <date> <time> (<secs> s) <below>,<read>,<write>,<both>`
///
/// Returns `Ok(None)` when the line does not have the expected shape.
fn parse_conn_bi_direct(directory: &str, line: &str) -> Result<Option<ConnBiDirectStats>> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 6 {
        return Ok(None);
    }
    let counters: Vec<&str> = parts[5].split(',').collect();
    if counters.len() != 4 {
        return Ok(None);
    }
    Ok(Some(ConnBiDirectStats {
        directory: directory.to_string(),
        stats_end: format!("{} {}", parts[1], parts[2]),
        seconds: parse_interval("conn-bi-direct", parts[3])?,
        below: parse_number("conn-bi-direct", counters[0])?,
        read: parse_number("conn-bi-direct", counters[1])?,
        write: parse_number("conn-bi-direct", counters[2])?,
        both: parse_number("conn-bi-direct", counters[3])?,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_doc(doc: &str) -> Result<ExtraInfoRecord<'_>> {
        let mut lines = doc.lines();
        let first = lines.next().unwrap();
        parse(doc.as_bytes(), first, lines)
    }

    fn document(body: &str) -> String {
        format!(
            "extra-info moria1 9695DFC35FFEB861329B9F1AB04C46397020CE31\n\
             published 2012-03-01 12:30:05\n\
             {body}router-signature\n\
             -----BEGIN SIGNATURE-----\n"
        )
    }

    #[test]
    fn test_header_and_histories() {
        let doc = document(
            "write-history 2012-03-01 12:00:00 (900 s) 1,2,3\n\
             read-history 2012-03-01 12:00:00 (900 s) 4,5,6\n\
             dirreq-write-history 2012-03-01 12:00:00 (900 s) 7\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert_eq!(record.nickname, "moria1");
        assert_eq!(record.directory, "9695dfc35ffeb861329b9f1ab04c46397020ce31");
        assert_eq!(record.published_time.as_deref(), Some("2012-03-01 12:30:05"));
        assert_eq!(record.bandwidth_history.len(), 3);
        assert!(record.bandwidth_history[0].starts_with("write-history "));
        assert_eq!(record.digest.len(), 40);
    }

    #[test]
    fn test_dirreq_counts_are_adjusted() {
        let doc = document(
            "dirreq-stats-end 2012-03-01 00:00:00 (86400 s)\n\
             dirreq-v3-reqs de=12,us=20,fr=8\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert_eq!(record.dir_req_stats.len(), 1);

        let stats = &record.dir_req_stats[0];
        assert_eq!(stats.stats_end.as_deref(), Some("2012-03-01 00:00:00"));
        assert_eq!(stats.seconds, Some(86400));
        assert_eq!(stats.requests["de"], 8);
        assert_eq!(stats.requests["us"], 16);
        assert_eq!(stats.requests["fr"], 4);
        assert_eq!(stats.requests[DIRREQ_TOTAL_KEY], 28);
    }

    #[test]
    fn test_short_stats_end_stops_scanning() {
        let doc = document(
            "dirreq-stats-end 2012-03-01\n\
             dirreq-v3-reqs de=12\n\
             write-history 2012-03-01 12:00:00 (900 s) 1\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert!(record.dir_req_stats.is_empty());
        assert!(record.bandwidth_history.is_empty());
    }

    #[test]
    fn test_bad_dirreq_count_stops_scanning() {
        let doc = document(
            "dirreq-v3-reqs de=lots\n\
             conn-bi-direct 2012-03-01 00:00:00 (86400 s) 1,2,3,4\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert!(record.dir_req_stats.is_empty());
        assert!(record.conn_bi_direct.is_empty());
    }

    #[test]
    fn test_overflowing_dirreq_counts_stop_scanning() {
        let doc = document(
            "dirreq-v3-reqs us=9223372036854775807,de=9\n\
             dirreq-v3-reqs de=-9223372036854775808\n\
             write-history 2012-03-01 12:00:00 (900 s) 1\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert!(record.dir_req_stats.is_empty());
        assert!(record.bandwidth_history.is_empty());
        assert_eq!(record.digest.len(), 40);

        assert!(matches!(
            parse_requests("de=-9223372036854775808"),
            Err(DescriptorError::Number { keyword: "dirreq-v3-reqs", .. })
        ));
        assert!(matches!(
            parse_requests("us=9223372036854775807,de=9"),
            Err(DescriptorError::Number { keyword: "dirreq-v3-reqs", .. })
        ));
    }

    #[test]
    fn test_conn_bi_direct_requires_four_counters() {
        let doc = document(
            "conn-bi-direct 2012-03-01 00:00:00 (86400 s) 1,2,3\n\
             conn-bi-direct 2012-03-01 00:00:00 (86400 s) 1,x,3,4\n\
             conn-bi-direct 2012-03-02 00:00:00 (86400 s) 10,20,30,40\n",
        );
        let record = parse_doc(&doc).unwrap();
        assert_eq!(record.conn_bi_direct.len(), 1);

        let stats = &record.conn_bi_direct[0];
        assert_eq!(stats.stats_end, "2012-03-02 00:00:00");
        assert_eq!(stats.seconds, 86400);
        assert_eq!((stats.below, stats.read, stats.write, stats.both), (10, 20, 30, 40));
    }

    #[test]
    fn test_missing_signature_is_rejected() {
        let doc = "extra-info moria1 9695DFC35FFEB861329B9F1AB04C46397020CE31\npublished 2012-03-01 12:30:05\n";
        assert!(matches!(
            parse_doc(doc),
            Err(DescriptorError::MissingLine("router-signature"))
        ));
    }
}
