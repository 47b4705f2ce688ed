//! Exclusive access guard for the history store
//!
//! Only one Colloquy process may own the store at a time. The guard takes a
//! non-blocking exclusive OS lock on a lock file next to the database and
//! polls until it succeeds or the wait budget runs out.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{ColloquyError, Result};

/// Delay between lock attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// RAII guard over an exclusive lock on the store lock file
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock, polling every 50 ms until `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::LockTimeout` if another holder kept the lock
    /// for the whole budget, or `ColloquyError::Lock` for any other failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use colloquy::storage::StoreLock;
    ///
    /// # fn main() -> colloquy::error::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let lock = StoreLock::acquire(&dir.path().join("history.lock"), Duration::from_secs(1))?;
    /// lock.release()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn acquire(target: &Path, timeout: Duration) -> Result<Self> {
        Self::acquire_with_interval(target, timeout, DEFAULT_POLL_INTERVAL)
    }

    /// Acquire the lock with an explicit poll interval
    ///
    /// The first attempt is immediate. The last sleep is shortened so one
    /// final attempt happens at the deadline.
    pub fn acquire_with_interval(target: &Path, timeout: Duration, poll: Duration) -> Result<Self> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ColloquyError::Lock(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(target)
            .map_err(|e| {
                ColloquyError::Lock(format!("Failed to open {}: {}", target.display(), e))
            })?;

        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    tracing::debug!(
                        path = %target.display(),
                        attempts,
                        "Acquired history lock"
                    );
                    return Ok(Self {
                        file,
                        path: target.to_path_buf(),
                    });
                }
                Err(e) if is_contended(&e) => {
                    tracing::trace!(attempts, "History lock is busy");
                }
                Err(e) => {
                    return Err(ColloquyError::Lock(format!(
                        "Failed to lock {}: {}",
                        target.display(),
                        e
                    ))
                    .into());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(started).as_millis() as u64;
                tracing::warn!(
                    path = %target.display(),
                    attempts,
                    waited_ms,
                    "Gave up waiting for history lock"
                );
                return Err(ColloquyError::LockTimeout {
                    path: target.display().to_string(),
                    attempts,
                    waited_ms,
                }
                .into());
            }

            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now instead of at drop
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Lock` if the OS refuses to unlock.
    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| {
            ColloquyError::Lock(format!("Failed to unlock {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Unlocking twice after release() is harmless.
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), "Unlock on drop failed: {}", e);
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
