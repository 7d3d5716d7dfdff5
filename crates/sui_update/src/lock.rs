//! Artifact lock.
//!
//! Serializes the inspect/delete/download/verify sequence on the update file
//! across concurrent requests:
//! - lock file created exclusively, holding PID and acquisition time
//! - locks whose holder is gone, or older than the stale limit, are reclaimed
//! - released on drop

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID holding the lock
    pub pid: u32,
    /// Unix epoch seconds
    pub acquired_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: process::id(),
            acquired_at: now_secs(),
        }
    }

    fn age_secs(&self) -> u64 {
        now_secs().saturating_sub(self.acquired_at)
    }

    fn process_exists(&self) -> bool {
        Path::new(&format!("/proc/{}", self.pid)).exists()
    }
}

/// Errors from lock operations
#[derive(Debug)]
pub enum LockError {
    /// Lock is held by another live process
    Held(LockInfo),
    Io(io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held(holder) => write!(
                f,
                "held by PID {} for {} seconds",
                holder.pid,
                holder.age_secs()
            ),
            Self::Io(e) => write!(f, "lock IO error: {}", e),
        }
    }
}

impl std::error::Error for LockError {}

impl From<io::Error> for LockError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Lock handle - releases lock on drop
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
}

impl ArtifactLock {
    /// Take the lock at `path`, reclaiming it if its holder is dead or it is
    /// older than `stale_secs`.
    pub fn acquire(path: &Path, stale_secs: u64) -> Result<Self, LockError> {
        // Second pass only happens after a reclaim
        for _ in 0..2 {
            match Self::try_create(path) {
                Ok(lock) => return Ok(lock),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            let holder = match fs::read_to_string(path)
                .ok()
                .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            {
                Some(holder) => holder,
                None => {
                    warn!(path = %path.display(), "Corrupted artifact lock, removing");
                    remove_if_present(path)?;
                    continue;
                }
            };

            if holder.age_secs() > stale_secs {
                warn!(pid = holder.pid, age = holder.age_secs(), "Stale artifact lock, removing");
            } else if !holder.process_exists() {
                warn!(pid = holder.pid, "Artifact lock held by dead process, removing");
            } else {
                return Err(LockError::Held(holder));
            }
            remove_if_present(path)?;
        }

        // Someone else won the race after our reclaim
        let holder = fs::read_to_string(path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .unwrap_or_else(LockInfo::current);
        Err(LockError::Held(holder))
    }

    fn try_create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let info = LockInfo::current();
        let content = serde_json::to_string(&info)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        file.write_all(content.as_bytes())?;
        debug!(path = %path.display(), pid = info.pid, "Artifact lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Check if we still hold the lock
    pub fn is_valid(&self) -> bool {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|c| serde_json::from_str::<LockInfo>(&c).ok())
            .map(|info| info.pid == process::id())
            .unwrap_or(false)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if self.is_valid() {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), "Failed to release artifact lock: {}", e);
            } else {
                debug!(path = %self.path.display(), "Artifact lock released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_lock(path: &Path, info: &LockInfo) {
        fs::write(path, serde_json::to_string(info).unwrap()).unwrap();
    }

    #[test]
    fn test_acquire_and_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");

        let lock = ArtifactLock::acquire(&path, 900).unwrap();
        assert!(path.exists());
        assert!(lock.is_valid());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_blocks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");

        // PID 1 always exists
        write_lock(&path, &LockInfo { pid: 1, acquired_at: now_secs() });

        match ArtifactLock::acquire(&path, 900) {
            Err(LockError::Held(holder)) => assert_eq!(holder.pid, 1),
            other => panic!("expected Held, got {:?}", other),
        }
        // Someone else's lock is left alone
        assert!(path.exists());
    }

    #[test]
    fn test_live_holder_inside_download_blocks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");
        let config = crate::config::UpdateConfig {
            lock_stale_secs: 900,
            ..Default::default()
        };

        // Held by this process, older than lock_stale_secs but still within
        // connect + download timeout
        let age = config.connect_timeout_secs + config.download_timeout_secs;
        write_lock(
            &path,
            &LockInfo {
                pid: process::id(),
                acquired_at: now_secs() - age,
            },
        );

        assert!(matches!(
            ArtifactLock::acquire(&path, config.lock_stale_limit()),
            Err(LockError::Held(_))
        ));
        assert!(path.exists());
    }

    #[test]
    fn test_dead_holder_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");

        write_lock(&path, &LockInfo { pid: 999_999_999, acquired_at: now_secs() });

        let lock = ArtifactLock::acquire(&path, 900).unwrap();
        assert!(lock.is_valid());
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");

        write_lock(&path, &LockInfo { pid: 1, acquired_at: now_secs() - 1_000 });

        let lock = ArtifactLock::acquire(&path, 900).unwrap();
        assert!(lock.is_valid());
    }

    #[test]
    fn test_corrupted_lock_reclaimed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sysupgrade.bin.lock");
        fs::write(&path, "not json").unwrap();

        let lock = ArtifactLock::acquire(&path, 900).unwrap();
        assert!(lock.is_valid());
    }
}
