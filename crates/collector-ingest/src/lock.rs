//! Run exclusivity lock
//!
//! The lock file holds the start time of the run that owns it, in
//! milliseconds since the epoch. A lock older than the staleness window is
//! considered abandoned and taken over.

use chrono::{Duration, Utc};
use collector_common::{CollectorError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_STALE_AFTER_MINUTES: i64 = 55;

#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
    stale_after: Duration,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock, failing with [`CollectorError::Lock`] while another
    /// run holds a fresh one
    pub fn acquire(&self) -> Result<()> {
        debug!(path = %self.path.display(), "Trying to acquire lock");
        let now = Utc::now().timestamp_millis();

        if self.path.exists() {
            let content = fs::read_to_string(&self.path)?;
            match content.trim().parse::<i64>() {
                Ok(run_started) if now - run_started < self.stale_after.num_milliseconds() => {
                    return Err(CollectorError::Lock(format!(
                        "{} is held by a run started at {} ms",
                        self.path.display(),
                        run_started
                    )));
                },
                Ok(run_started) => {
                    warn!(path = %self.path.display(), run_started, "Taking over stale lock");
                },
                Err(_) => {
                    warn!(path = %self.path.display(), content = %content.trim(), "Lock file is unreadable. Taking it over.");
                },
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", now))?;
        debug!(path = %self.path.display(), "Acquired lock");
        Ok(())
    }

    pub fn release(&self) -> Result<()> {
        debug!(path = %self.path.display(), "Releasing lock");
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock(temp: &TempDir) -> RunLock {
        RunLock::new(temp.path().join("lock"), Duration::minutes(DEFAULT_STALE_AFTER_MINUTES))
    }

    #[test]
    fn test_acquire_release_acquire() {
        let temp = TempDir::new().unwrap();
        let lock = lock(&temp);

        lock.acquire().unwrap();
        assert!(lock.path().exists());
        assert!(matches!(lock.acquire(), Err(CollectorError::Lock(_))));

        lock.release().unwrap();
        assert!(!lock.path().exists());
        lock.acquire().unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let temp = TempDir::new().unwrap();
        let lock = lock(&temp);
        let started = Utc::now() - Duration::minutes(56);
        fs::write(lock.path(), format!("{}\n", started.timestamp_millis())).unwrap();

        lock.acquire().unwrap();
        let owner: i64 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
        assert!(owner > started.timestamp_millis());
    }

    #[test]
    fn test_fresh_foreign_lock_is_respected() {
        let temp = TempDir::new().unwrap();
        let lock = lock(&temp);
        let started = Utc::now() - Duration::minutes(54);
        fs::write(lock.path(), format!("{}\n", started.timestamp_millis())).unwrap();

        assert!(lock.acquire().is_err());
    }

    #[test]
    fn test_release_without_lock_is_ok() {
        let temp = TempDir::new().unwrap();
        lock(&temp).release().unwrap();
    }
}
