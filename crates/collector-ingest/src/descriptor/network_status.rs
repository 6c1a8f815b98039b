//! Consensus and vote grammar
//!
//! Single forward pass, one line at a time. A status entry opens on an `r`
//! line and is finalized when the next `r` line or the end of the document
//! is reached; finalized consensus entries are handed to `on_entry`
//! immediately, so they survive a later failure in the same document.

use chrono::{DateTime, Utc};
use collector_common::digest::sha1_hex_upper;
use std::collections::BTreeSet;
use tracing::warn;

use super::digest::DigestExtractor;
use super::error::{DescriptorError, Result};
use super::fields::{decode_base64, malformed, parse_number, parse_timestamp};
use super::kind::DocumentKind;
use super::models::{NetworkStatus, StatusEntry};

/// Minimum token count of an `r` line
const R_LINE_TOKENS: usize = 9;

struct OpenEntry {
    entry: StatusEntry,
    raw: String,
}

impl OpenEntry {
    fn append_raw(&mut self, line: &str) {
        self.raw.push_str(line);
        self.raw.push('\n');
    }

    fn close(self) -> StatusEntry {
        let mut entry = self.entry;
        entry.raw = self.raw.into_bytes();
        entry
    }
}

#[derive(Default)]
struct Header {
    is_vote: bool,
    valid_after: Option<(DateTime<Utc>, String)>,
    dir_source: Option<String>,
    dir_sources: BTreeSet<String>,
    fingerprint: Option<String>,
}

/// Parse the lines after `network-status-version 3`
///
/// `on_entry` receives every finalized entry of a consensus together with
/// the consensus' valid-after time. Vote entries are counted but not
/// emitted.
pub fn parse<'a, 'l>(
    data: &'a [u8],
    lines: impl Iterator<Item = &'l str>,
    mut on_entry: impl FnMut(DateTime<Utc>, &StatusEntry),
) -> Result<NetworkStatus<'a>> {
    let mut header = Header::default();
    let mut open: Option<OpenEntry> = None;
    let mut referenced_descriptors = BTreeSet::new();
    let mut hashed_relay_identities = BTreeSet::new();
    let mut entry_count = 0usize;

    let mut finalize = |open: OpenEntry, header: &Header, entry_count: &mut usize| -> Result<()> {
        let entry = open.close();
        *entry_count += 1;
        if !header.is_vote {
            let (valid_after, _) = header
                .valid_after
                .as_ref()
                .ok_or(DescriptorError::MissingLine("valid-after"))?;
            on_entry(*valid_after, &entry);
        }
        Ok(())
    };

    for line in lines {
        if line == "vote-status vote" {
            header.is_vote = true;
        } else if let Some(time) = line.strip_prefix("valid-after ") {
            header.valid_after = Some((parse_timestamp(time)?, time.to_string()));
        } else if line.starts_with("dir-source ") {
            let identity = line.split(' ').nth(2).ok_or_else(|| malformed("dir-source", line))?;
            header.dir_source = Some(identity.to_string());
        } else if line.starts_with("vote-digest ") {
            if let Some(dir_source) = &header.dir_source {
                header.dir_sources.insert(dir_source.clone());
            }
        } else if line.starts_with("fingerprint ") {
            header.fingerprint = line.split(' ').nth(1).map(str::to_string);
        } else if line.starts_with("r ") {
            if let Some(previous) = open.take() {
                finalize(previous, &header, &mut entry_count)?;
            }

            let parts: Vec<&str> = line.split(' ').collect();
            if parts.len() < R_LINE_TOKENS {
                warn!(line = %line, "Could not parse r line in descriptor. Skipping rest of document.");
                break;
            }

            let identity = decode_base64(parts[2])?;
            let relay_identity = hex::encode(&identity);
            let descriptor_digest = hex::encode(decode_base64(parts[3])?);
            let published_time = format!("{} {}", parts[4], parts[5]);
            let published = parse_timestamp(&published_time)?;

            referenced_descriptors.insert(format!(
                "{},{},{}",
                published_time, relay_identity, descriptor_digest
            ));
            hashed_relay_identities.insert(sha1_hex_upper(&identity));

            let mut entry = OpenEntry {
                entry: StatusEntry {
                    nickname: parts[1].to_string(),
                    relay_identity,
                    descriptor_digest,
                    published,
                    address: parts[6].to_string(),
                    or_port: parse_number("r", parts[7])?,
                    dir_port: parse_number("r", parts[8])?,
                    flags: BTreeSet::new(),
                    version: None,
                    bandwidth: None,
                    ports: None,
                    raw: Vec::new(),
                },
                raw: String::new(),
            };
            entry.append_raw(line);
            open = Some(entry);
        } else if line.starts_with("s ") || line == "s" {
            if let Some(current) = open.as_mut() {
                current.append_raw(line);
                current.entry.flags = line
                    .split(' ')
                    .skip(1)
                    .filter(|flag| !flag.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        } else if let Some(version) = line.strip_prefix("v ") {
            if let Some(current) = open.as_mut() {
                current.append_raw(line);
                current.entry.version = Some(version.to_string());
            }
        } else if line.starts_with("w ") {
            if let Some(current) = open.as_mut() {
                current.append_raw(line);
                for part in line.split(' ') {
                    if let Some(value) = part.strip_prefix("Bandwidth=") {
                        current.entry.bandwidth = Some(parse_number("w", value)?);
                    }
                }
            }
        } else if let Some(ports) = line.strip_prefix("p ") {
            if let Some(current) = open.as_mut() {
                current.append_raw(line);
                current.entry.ports = Some(ports.to_string());
            }
        }
    }

    if let Some(last) = open.take() {
        finalize(last, &header, &mut entry_count)?;
    }

    let (valid_after, valid_after_time) = header
        .valid_after
        .ok_or(DescriptorError::MissingLine("valid-after"))?;

    let signed_digest = if header.is_vote {
        DigestExtractor::for_kind(DocumentKind::NetworkStatus).and_then(|extractor| extractor.digest(data))
    } else {
        None
    };

    Ok(NetworkStatus {
        is_vote: header.is_vote,
        valid_after,
        valid_after_time,
        dir_source: header.dir_source,
        dir_sources: header.dir_sources,
        fingerprint: header.fingerprint,
        referenced_descriptors,
        hashed_relay_identities,
        entry_count,
        signed_digest,
        raw: data,
    })
}
