//! Age and suffix based pruning and renaming of output trees
//!
//! All functions walk the given directory recursively and only touch regular
//! files. Suffixes are matched case sensitively.

use collector_common::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

fn files_below(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn modified_before(path: &Path, cutoff: SystemTime) -> Result<bool> {
    Ok(fs::metadata(path)?.modified()? < cutoff)
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(suffix))
}

/// Delete every file last modified before `cutoff`
///
/// Returns the number of deleted files.
pub fn clean_dir(directory: &Path, cutoff: SystemTime) -> Result<usize> {
    let mut deleted = 0;
    for path in files_below(directory)? {
        if modified_before(&path, cutoff)? {
            fs::remove_file(&path)?;
            deleted += 1;
        }
    }
    debug!(dir = %directory.display(), deleted, "Cleaned directory");
    Ok(deleted)
}

/// Delete every file last modified before `cutoff` whose name ends with one
/// of `endings`
pub fn clean_dir_pattern(directory: &Path, cutoff: SystemTime, endings: &[&str]) -> Result<usize> {
    let mut deleted = 0;
    for path in files_below(directory)? {
        if endings.iter().any(|ending| has_suffix(&path, ending)) && modified_before(&path, cutoff)? {
            fs::remove_file(&path)?;
            deleted += 1;
        }
    }
    debug!(dir = %directory.display(), deleted, ?endings, "Cleaned directory by pattern");
    Ok(deleted)
}

/// Rename `<name><ending>` to `<name>`, replacing an existing target
pub fn rename_files(directory: &Path, ending: &str) -> Result<usize> {
    let mut renamed = 0;
    for path in files_below(directory)? {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(target_name) = name.strip_suffix(ending) else {
            continue;
        };
        if target_name.is_empty() {
            continue;
        }
        let target = path.with_file_name(target_name);
        fs::rename(&path, &target)?;
        renamed += 1;
    }
    debug!(dir = %directory.display(), renamed, ending, "Renamed files");
    Ok(renamed)
}

pub fn rename_tmp_files(directory: &Path) -> Result<usize> {
    rename_files(directory, ".tmp")
}
