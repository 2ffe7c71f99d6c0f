//! Writer lock hook around cache creation.
//!
//! Two writers never share a temp file: the publisher holds an exclusive
//! `flock` on it, so a writer arriving while another is filling the cache
//! fails with `CacheOpenTmp`. Callers that would rather wait for the first
//! writer plug a [`WriterLock`] into the handle. The default [`NoLock`]
//! waits for nothing.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CacheOp, Error};
use crate::path::lock_path_for;

/// Default time [`LockFile`] waits for a competing writer.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Acquires exclusive write access to a cache path for the duration of a create.
pub trait WriterLock: Send + Sync {
    /// Block until `cache_path` may be written, or fail.
    fn acquire(&self, cache_path: &Path) -> Result<WriterLockGuard, Error>;
}

/// Held for the duration of a create; releases the lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct WriterLockGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WriterLockGuard {
    /// A guard that holds nothing.
    pub fn unlocked() -> Self {
        Self { release: None }
    }

    /// A guard that runs `release` when dropped.
    pub fn on_release(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for WriterLockGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for WriterLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterLockGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}

// =============================================================================
// NoLock
// =============================================================================

/// No waiting; a writer that finds the temp file busy fails instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl WriterLock for NoLock {
    fn acquire(&self, _cache_path: &Path) -> Result<WriterLockGuard, Error> {
        Ok(WriterLockGuard::unlocked())
    }
}

// =============================================================================
// LockFile
// =============================================================================

/// Advisory lock through an exclusively created `<cache>.lock` sibling file.
///
/// A lock file left behind by a crashed writer blocks later writers until it
/// is removed by hand.
#[derive(Debug, Clone)]
pub struct LockFile {
    timeout: Duration,
}

impl LockFile {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterLock for LockFile {
    fn acquire(&self, cache_path: &Path) -> Result<WriterLockGuard, Error> {
        let lock_path = lock_path_for(cache_path)?;
        let started = Instant::now();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => {
                    debug!(path = %lock_path.display(), "Acquired writer lock");
                    return Ok(WriterLockGuard::on_release(move || {
                        release_lock_file(lock_path)
                    }));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.timeout {
                        return Err(Error::cache_io(
                            CacheOp::Lock,
                            lock_path,
                            io::Error::new(
                                io::ErrorKind::TimedOut,
                                "timed out waiting for writer lock",
                            ),
                        ));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(Error::cache_io(CacheOp::Lock, lock_path, e)),
            }
        }
    }
}

fn release_lock_file(lock_path: PathBuf) {
    match fs::remove_file(&lock_path) {
        Ok(()) => debug!(path = %lock_path.display(), "Released writer lock"),
        Err(e) => warn!(path = %lock_path.display(), "Failed to remove lock file: {}", e),
    }
}

// =============================================================================
// Tests
// =============================================================================
