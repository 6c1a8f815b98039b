//! Raw descriptor provider over a local directory tree
//!
//! Every regular file below the archives directory is one descriptor
//! document. Files ending in `.bz2` or `.gz` are decompressed first;
//! compressed tarballs are not supported and skipped with a warning.

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::descriptor::{DescriptorParser, ParseOutcome};
use crate::history::ImportHistoryLedger;
use crate::sinks::ConsumerFanout;

/// Reading a directory stops after this many failed files
pub const MAX_PROBLEMS: usize = 3;

/// Counts of one import pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Files read and handed to the parser
    pub parsed_files: usize,
    /// Files skipped because the import history lists them
    pub ignored_files: usize,
    /// Files the parser could not make sense of
    pub failed_documents: usize,
    pub problems: Vec<PathBuf>,
}

pub struct ArchiveReader {
    archives_directory: PathBuf,
}

impl ArchiveReader {
    pub fn new(archives_directory: impl Into<PathBuf>) -> Self {
        Self {
            archives_directory: archives_directory.into(),
        }
    }

    /// Parse every file below the archives directory
    ///
    /// With a ledger, files it already lists are skipped and every file that
    /// is read is recorded before it is parsed.
    pub fn import(
        &self,
        parser: &DescriptorParser,
        fanout: &mut ConsumerFanout,
        mut ledger: Option<&mut ImportHistoryLedger>,
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();
        if !self.archives_directory.exists() {
            debug!(dir = %self.archives_directory.display(), "Archives directory does not exist");
            return summary;
        }

        debug!(dir = %self.archives_directory.display(), "Importing files");
        for entry in WalkDir::new(&self.archives_directory).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %e, "Could not list archive entry");
                    summary.problems.push(path);
                    if summary.problems.len() > MAX_PROBLEMS {
                        break;
                    }
                    continue;
                },
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if ledger.as_ref().is_some_and(|ledger| ledger.should_skip(&name)) {
                summary.ignored_files += 1;
                continue;
            }
            if name.ends_with(".tar.bz2") {
                warn!(path = %path.display(), "Cannot parse compressed tarball. Skipping.");
                continue;
            }
            if let Some(ledger) = ledger.as_mut() {
                ledger.record(name.as_str());
            }

            match read_document(path) {
                Ok(data) => {
                    if parser.parse(&data, fanout) == ParseOutcome::Failed {
                        summary.failed_documents += 1;
                    }
                    summary.parsed_files += 1;
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed importing file");
                    summary.problems.push(path.to_path_buf());
                    if summary.problems.len() > MAX_PROBLEMS {
                        break;
                    }
                },
            }
        }

        if summary.problems.is_empty() {
            debug!(dir = %self.archives_directory.display(), "Finished importing files");
        } else {
            warn!(
                dir = %self.archives_directory.display(),
                problems = summary.problems.len(),
                first = ?summary.problems.iter().take(MAX_PROBLEMS).collect::<Vec<_>>(),
                "Failed importing files in directory"
            );
        }
        info!(
            parsed = summary.parsed_files,
            ignored = summary.ignored_files,
            "Finished importing relay descriptors from local directory"
        );
        summary
    }
}

/// Read a file, decompressing by extension
pub fn read_document(path: &Path) -> Result<Vec<u8>> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    if name.ends_with(".bz2") {
        decompress_bzip2(&raw)
    } else if name.ends_with(".gz") {
        decompress_gzip(&raw)
    } else {
        Ok(raw)
    }
}

pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .context("Failed to decompress gzip data")?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

pub fn decompress_bzip2(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .context("Failed to decompress bzip2 data")?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}
