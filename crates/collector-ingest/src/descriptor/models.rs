//! Structured results of descriptor parsing

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One relay row inside a consensus or vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub nickname: String,
    /// Relay identity, base64-decoded and lowercase hex
    pub relay_identity: String,
    /// Server descriptor digest, base64-decoded and lowercase hex
    pub descriptor_digest: String,
    pub published: DateTime<Utc>,
    pub address: String,
    pub or_port: u16,
    pub dir_port: u16,
    pub flags: BTreeSet<String>,
    pub version: Option<String>,
    pub bandwidth: Option<u64>,
    pub ports: Option<String>,
    /// The `r`/`s`/`v`/`w`/`p` lines of this entry, newline terminated
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// A fully parsed network status document
///
/// `dir_source` is the identity from the last `dir-source` line, which
/// for a vote is the voting authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatus<'a> {
    pub is_vote: bool,
    pub valid_after: DateTime<Utc>,
    /// `valid-after` exactly as written in the document
    pub valid_after_time: String,
    pub dir_source: Option<String>,
    /// Authorities confirmed by a `vote-digest` line
    pub dir_sources: BTreeSet<String>,
    /// Authority fingerprint of a vote
    pub fingerprint: Option<String>,
    /// `<published>,<identity>,<descriptor digest>` per `r` line
    pub referenced_descriptors: BTreeSet<String>,
    /// Uppercase hex SHA-1 of each status entry's decoded identity
    pub hashed_relay_identities: BTreeSet<String>,
    pub entry_count: usize,
    /// Uppercase hex SHA-1 of the signed section (votes only)
    pub signed_digest: Option<String>,
    #[serde(skip)]
    pub raw: &'a [u8],
}

/// Advertised bandwidth of a relay in bytes per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandwidthTriple {
    pub average: u64,
    pub burst: u64,
    pub observed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptorRecord<'a> {
    /// Lowercase hex SHA-1 from `router ` through `\nrouter-signature\n`
    pub digest: String,
    pub nickname: String,
    pub address: String,
    pub or_port: u16,
    pub dir_port: u16,
    pub fingerprint: Option<String>,
    pub bandwidth: Option<BandwidthTriple>,
    pub platform: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub published_time: Option<String>,
    pub uptime: Option<u64>,
    pub extra_info_digest: Option<String>,
    #[serde(skip)]
    pub raw: &'a [u8],
}

/// Directory request statistics from one `dirreq-v3-reqs` line
///
/// Counts are already reduced by [`DIRREQ_ROUNDING_OFFSET`]. The total
/// over all countries is stored under [`DIRREQ_TOTAL_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirReqStats {
    pub directory: String,
    pub stats_end: Option<String>,
    pub seconds: Option<u64>,
    pub requests: BTreeMap<String, i64>,
}

/// Reported by relays as `<n>+` rounded up to multiples of 8.
pub const DIRREQ_ROUNDING_OFFSET: i64 = 4;

pub const DIRREQ_TOTAL_KEY: &str = "zy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnBiDirectStats {
    pub directory: String,
    pub stats_end: String,
    pub seconds: u64,
    pub below: u64,
    pub read: u64,
    pub write: u64,
    pub both: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraInfoRecord<'a> {
    /// Lowercase hex SHA-1 from `extra-info ` through `\nrouter-signature\n`
    pub digest: String,
    pub nickname: String,
    /// Lowercase relay fingerprint from the `extra-info` line
    pub directory: String,
    pub published: Option<DateTime<Utc>>,
    pub published_time: Option<String>,
    /// `read-history`, `write-history`, `dirreq-*-history` lines verbatim
    pub bandwidth_history: Vec<String>,
    #[serde(skip)]
    pub dir_req_stats: Vec<DirReqStats>,
    #[serde(skip)]
    pub conn_bi_direct: Vec<ConnBiDirectStats>,
    #[serde(skip)]
    pub raw: &'a [u8],
}

/// Document-level result handed to every sink once per document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ParsedDescriptor<'a> {
    Consensus(NetworkStatus<'a>),
    Vote(NetworkStatus<'a>),
    ServerDescriptor(ServerDescriptorRecord<'a>),
    ExtraInfo(ExtraInfoRecord<'a>),
}

impl ParsedDescriptor<'_> {
    /// Raw bytes of the whole document
    pub fn raw(&self) -> &[u8] {
        match self {
            ParsedDescriptor::Consensus(status) | ParsedDescriptor::Vote(status) => status.raw,
            ParsedDescriptor::ServerDescriptor(record) => record.raw,
            ParsedDescriptor::ExtraInfo(record) => record.raw,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ParsedDescriptor::Consensus(_) => "consensus",
            ParsedDescriptor::Vote(_) => "vote",
            ParsedDescriptor::ServerDescriptor(_) => "server-descriptor",
            ParsedDescriptor::ExtraInfo(_) => "extra-info",
        }
    }
}
