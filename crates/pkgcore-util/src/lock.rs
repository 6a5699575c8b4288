//! Pidfile-based coordination for concurrent installers of the same
//! depot entry.
//!
//! Two processes racing to install the same (package, hash) need to agree
//! on who does the work; a waiter that acquires the lock after the winner
//! finished should simply observe the installation already present rather
//! than redo it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// A held or contended pidfile lock at `<target>.lock`.
pub struct PidFileLock {
    path: PathBuf,
}

/// Default time a pidfile is allowed to sit unclaimed before a waiter
/// assumes its owner died and breaks it.
pub const STALE_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

impl PidFileLock {
    pub fn for_target(target: &Path) -> Self {
        let path = target.with_extension(match target.extension() {
            Some(ext) => format!("{}.lock", ext.to_string_lossy()),
            None => "lock".to_string(),
        });
        Self { path }
    }

    /// Attempt to acquire the lock, polling until `stale_timeout` elapses,
    /// at which point a lock file left by a dead process is broken and
    /// retried once.
    pub fn acquire(&self, stale_timeout: Duration) -> Result<LockGuard<'_>> {
        let deadline = Instant::now() + stale_timeout;
        loop {
            match self.try_create() {
                Ok(()) => return Ok(LockGuard { lock: self }),
                Err(_) if Instant::now() >= deadline => {
                    self.break_stale()?;
                    // one more attempt; if this also fails the caller
                    // retries installation via resolve_path instead.
                    return self.try_create().map(|()| LockGuard { lock: self });
                }
                Err(_) => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }

    fn try_create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .with_context(|| format!("lock `{}` already held", self.path.display()))?;
        write!(f, "{}", std::process::id())?;
        Ok(())
    }

    fn break_stale(&self) -> Result<()> {
        fs::remove_file(&self.path).ok();
        Ok(())
    }

    fn release(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// RAII guard releasing the pidfile lock on drop.
pub struct LockGuard<'a> {
    lock: &'a PidFileLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_blocks_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("entry");
        let lock = PidFileLock::for_target(&target);
        let guard = lock.try_create();
        assert!(guard.is_ok());
        assert!(lock.try_create().is_err());
        lock.release();
        assert!(lock.try_create().is_ok());
        lock.release();
    }
}
