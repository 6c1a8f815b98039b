//! Raw descriptor archive
//!
//! Layout below the output directory:
//!
//! ```text
//! consensus/YYYY/MM/DD/YYYY-MM-DD-HH-MM-SS-consensus
//! vote/YYYY/MM/DD/YYYY-MM-DD-HH-MM-SS-vote-<authority>-<digest>
//! server-descriptor/YYYY/MM/<d0>/<d1>/<digest>
//! extra-info/YYYY/MM/<d0>/<d1>/<digest>
//! ```
//!
//! A file that already exists is left alone, so storing the same document
//! twice is a no-op.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::{DescriptorSink, SinkStage};
use crate::descriptor::ParsedDescriptor;

pub struct ArchiveWriter {
    output_directory: PathBuf,
    stored: usize,
    already_present: usize,
}

impl ArchiveWriter {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            stored: 0,
            already_present: 0,
        }
    }

    pub fn stored(&self) -> usize {
        self.stored
    }

    pub fn already_present(&self) -> usize {
        self.already_present
    }

    /// Archive path of a descriptor, relative to the output directory
    pub fn relative_path(descriptor: &ParsedDescriptor<'_>) -> Result<PathBuf> {
        match descriptor {
            ParsedDescriptor::Consensus(status) => {
                let va = status.valid_after;
                Ok(PathBuf::from(format!(
                    "consensus/{}/{}-consensus",
                    va.format("%Y/%m/%d"),
                    va.format("%Y-%m-%d-%H-%M-%S")
                )))
            },
            ParsedDescriptor::Vote(status) => {
                let authority = status
                    .dir_source
                    .as_deref()
                    .ok_or_else(|| anyhow!("vote without dir-source line"))?;
                if !is_fingerprint(authority) {
                    return Err(anyhow!("vote authority '{}' is not a hex fingerprint", authority));
                }
                let digest = status
                    .signed_digest
                    .as_deref()
                    .ok_or_else(|| anyhow!("vote without a signed section"))?;
                let va = status.valid_after;
                Ok(PathBuf::from(format!(
                    "vote/{}/{}-vote-{}-{}",
                    va.format("%Y/%m/%d"),
                    va.format("%Y-%m-%d-%H-%M-%S"),
                    authority,
                    digest
                )))
            },
            ParsedDescriptor::ServerDescriptor(record) => {
                digest_path("server-descriptor", record.published, &record.digest)
            },
            ParsedDescriptor::ExtraInfo(record) => {
                digest_path("extra-info", record.published, &record.digest)
            },
        }
    }

    fn store(&mut self, relative: &Path, raw: &[u8]) -> Result<()> {
        let path = self.output_directory.join(relative);
        if path.exists() {
            trace!(path = %path.display(), "Descriptor already archived");
            self.already_present += 1;
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
        self.stored += 1;
        Ok(())
    }
}

/// 40 hex characters, so it is safe as part of a file name
fn is_fingerprint(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn digest_path(kind: &str, published: Option<DateTime<Utc>>, digest: &str) -> Result<PathBuf> {
    let published = published.ok_or_else(|| anyhow!("{} {} has no published line", kind, digest))?;
    let mut chars = digest.chars();
    let (Some(d0), Some(d1)) = (chars.next(), chars.next()) else {
        return Err(anyhow!("{} digest '{}' is too short", kind, digest));
    };
    Ok(PathBuf::from(format!(
        "{}/{}/{}/{}/{}",
        kind,
        published.format("%Y/%m"),
        d0,
        d1,
        digest
    )))
}

impl DescriptorSink for ArchiveWriter {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn stage(&self) -> SinkStage {
        SinkStage::Archive
    }

    fn on_descriptor(&mut self, descriptor: &ParsedDescriptor<'_>) -> Result<()> {
        let relative = Self::relative_path(descriptor)?;
        self.store(&relative, descriptor.raw())
    }

    fn finish(&mut self) -> Result<()> {
        debug!(
            stored = self.stored,
            already_present = self.already_present,
            "Finished writing directory archives"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::descriptor::{ExtraInfoRecord, NetworkStatus};
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn extra_info(raw: &'static [u8]) -> ParsedDescriptor<'static> {
        ParsedDescriptor::ExtraInfo(ExtraInfoRecord {
            digest: "e5b6ac4e9dd32a6e1d2e7a8a3d4a8f5eb6c5a1f0".to_string(),
            nickname: "moria1".to_string(),
            directory: "9695dfc35ffeb861329b9f1ab04c46397020ce31".to_string(),
            published: Some(Utc.with_ymd_and_hms(2012, 3, 1, 12, 30, 5).unwrap()),
            published_time: Some("2012-03-01 12:30:05".to_string()),
            bandwidth_history: Vec::new(),
            dir_req_stats: Vec::new(),
            conn_bi_direct: Vec::new(),
            raw,
        })
    }

    #[test]
    fn test_digest_path_layout() {
        let path = ArchiveWriter::relative_path(&extra_info(b"x")).unwrap();
        assert_eq!(
            path,
            PathBuf::from("extra-info/2012/03/e/5/e5b6ac4e9dd32a6e1d2e7a8a3d4a8f5eb6c5a1f0")
        );
    }

    #[test]
    fn test_store_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp.path());

        writer.on_descriptor(&extra_info(b"first")).unwrap();
        writer.on_descriptor(&extra_info(b"second")).unwrap();

        assert_eq!(writer.stored(), 1);
        assert_eq!(writer.already_present(), 1);
        let path = temp
            .path()
            .join("extra-info/2012/03/e/5/e5b6ac4e9dd32a6e1d2e7a8a3d4a8f5eb6c5a1f0");
        assert_eq!(fs::read(path).unwrap(), b"first");
    }

    fn vote(authority: &str) -> ParsedDescriptor<'static> {
        ParsedDescriptor::Vote(NetworkStatus {
            is_vote: true,
            valid_after: Utc.with_ymd_and_hms(2012, 3, 1, 12, 0, 0).unwrap(),
            valid_after_time: "2012-03-01 12:00:00".to_string(),
            dir_source: Some(authority.to_string()),
            dir_sources: BTreeSet::new(),
            fingerprint: Some(authority.to_string()),
            referenced_descriptors: BTreeSet::new(),
            hashed_relay_identities: BTreeSet::new(),
            entry_count: 0,
            signed_digest: Some("851FC3FB".repeat(5)),
            raw: b"network-status-version 3\n",
        })
    }

    #[test]
    fn test_vote_path_uses_authority_and_digest() {
        let path = ArchiveWriter::relative_path(&vote("9695DFC35FFEB861329B9F1AB04C46397020CE31")).unwrap();
        assert_eq!(
            path,
            PathBuf::from(format!(
                "vote/2012/03/01/2012-03-01-12-00-00-vote-9695DFC35FFEB861329B9F1AB04C46397020CE31-{}",
                "851FC3FB".repeat(5)
            ))
        );
    }

    #[test]
    fn test_vote_authority_must_be_fingerprint() {
        for authority in ["../../../../escaped", "moria1", "9695DFC35FFEB861329B9F1AB04C46397020CE3/", ""] {
            assert!(ArchiveWriter::relative_path(&vote(authority)).is_err(), "{authority}");
        }

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a/b/archive");
        let mut writer = ArchiveWriter::new(&root);
        assert!(writer.on_descriptor(&vote("../../../../../../escaped")).is_err());
        assert_eq!(writer.stored(), 0);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unpublished_descriptor_is_rejected() {
        let mut descriptor = extra_info(b"x");
        if let ParsedDescriptor::ExtraInfo(record) = &mut descriptor {
            record.published = None;
        }
        assert!(ArchiveWriter::relative_path(&descriptor).is_err());
    }
}
