//! Run-level lock so two tracker runs never write the log or push at once.
//!
//! The lock is a file created with `create_new`; its contents identify the
//! holder. A lock older than the stale threshold is assumed to belong to a
//! crashed run and is replaced.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run holds '{}' ({holder})", .path.display())]
    Held { path: PathBuf, holder: String },

    #[error("lock I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Held for the lifetime of a run; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Default age after which an abandoned lock is broken.
    pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

    pub fn acquire(path: impl Into<PathBuf>, stale_after: Duration) -> Result<Self, LockError> {
        let path = path.into();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(
                        file,
                        "pid={} acquired_at={}",
                        std::process::id(),
                        chrono::Utc::now().to_rfc3339()
                    )
                    .map_err(io_err)?;
                    tracing::debug!(path = %path.display(), "run lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_age(&path).is_some_and(|age| age >= stale_after) {
                        tracing::warn!(path = %path.display(), "breaking stale run lock");
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(io_err(e)),
                        }
                    }
                    let holder = fs::read_to_string(&path)
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| "unknown holder".into());
                    return Err(LockError::Held { path, holder });
                }
                Err(e) => return Err(io_err(e)),
            }
        }

        let holder = "lock recreated concurrently".to_string();
        Err(LockError::Held { path, holder })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}
