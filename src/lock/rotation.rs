//! Rotation lock
//!
//! Mutual exclusion is the atomic "create if absent" of a marker directory.
//! A marker older than the staleness threshold belongs to a process that
//! crashed mid-rotation and is removed before retrying.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::config::EngineTuning;
use crate::error::{Error, Result};
use crate::lock::ROTATION_LOCK_NAME;

/// Per-directory rotation lock
#[derive(Debug, Clone)]
pub struct RotationLock {
    /// Marker directory path
    path: PathBuf,
    /// Delay between acquisition attempts
    retry_delay: Duration,
    /// Number of acquisition attempts
    attempts: u32,
    /// Marker age after which the lock is considered abandoned
    stale_after: Duration,
}

impl RotationLock {
    /// Create a rotation lock living in `lock_dir`
    pub fn new(lock_dir: &Path, tuning: &EngineTuning) -> Self {
        Self {
            path: lock_dir.join(ROTATION_LOCK_NAME),
            retry_delay: tuning.lock_retry_delay,
            attempts: tuning.lock_retry_attempts.max(1),
            stale_after: tuning.lock_stale_after,
        }
    }

    /// Path of the marker directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether some process currently holds the lock
    pub fn is_held(&self) -> bool {
        self.path.is_dir()
    }

    /// Make a single acquisition attempt
    pub fn try_acquire(&self) -> Result<Option<RotationGuard>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::create_dir(&self.path) {
            Ok(()) => return Ok(Some(RotationGuard::new(self.path.clone()))),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::lock(&self.path, format!("Failed to create lock: {}", e)));
            }
        }

        if !self.is_stale() {
            return Ok(None);
        }

        warn!(path = %self.path.display(), "removing abandoned rotation lock");
        remove_marker(&self.path)?;

        match fs::create_dir(&self.path) {
            Ok(()) => Ok(Some(RotationGuard::new(self.path.clone()))),
            // Another process reclaimed it first
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(Error::lock(&self.path, format!("Failed to create lock: {}", e))),
        }
    }

    /// Acquire the lock with bounded retries
    ///
    /// Returns `None` once every attempt has failed; the caller then proceeds
    /// without the lock rather than blocking.
    pub fn acquire(&self) -> Option<RotationGuard> {
        for attempt in 0..self.attempts {
            match self.try_acquire() {
                Ok(Some(guard)) => return Some(guard),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "rotation lock attempt failed"),
            }
            if attempt + 1 < self.attempts {
                thread::sleep(self.retry_delay);
            }
        }

        debug!(path = %self.path.display(), attempts = self.attempts, "rotation lock busy, degrading");
        None
    }

    fn is_stale(&self) -> bool {
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            // Vanished between create and stat: let the next attempt race for it
            Err(_) => return false,
        };

        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > self.stale_after)
            .unwrap_or(false)
    }
}

/// Exclusive ownership of the rotation critical section
///
/// The marker is removed when the guard is released or dropped, whatever the
/// outcome of the rotation.
#[derive(Debug)]
pub struct RotationGuard {
    path: PathBuf,
    released: bool,
}

impl RotationGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, released: false }
    }

    /// Release the lock
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        remove_marker(&self.path)
    }
}

impl Drop for RotationGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = remove_marker(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to release rotation lock");
            }
        }
    }
}

/// Remove a marker directory; a missing marker is not an error
fn remove_marker(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::lock(path, format!("Failed to remove lock: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use tempfile::tempdir;

    fn quick_tuning() -> EngineTuning {
        EngineTuning {
            lock_retry_delay: Duration::from_millis(5),
            lock_retry_attempts: 4,
            lock_stale_after: Duration::from_secs(10),
            ..EngineTuning::default()
        }
    }

    #[test]
    fn test_acquire_and_release() -> Result<()> {
        let temp_dir = tempdir()?;
        let lock = RotationLock::new(&temp_dir.path().join(".locks"), &quick_tuning());

        let guard = lock.try_acquire()?.expect("lock should be free");
        assert!(lock.is_held());
        assert!(lock.try_acquire()?.is_none());

        guard.release()?;
        assert!(!lock.is_held());

        // Releasing twice is harmless
        remove_marker(lock.path())?;

        {
            let _guard = lock.try_acquire()?.expect("lock should be free again");
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());

        Ok(())
    }

    #[test]
    fn test_simultaneous_acquisition_has_one_winner() -> Result<()> {
        let temp_dir = tempdir()?;
        let lock_dir = temp_dir.path().join(".locks");
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let lock = RotationLock::new(&lock_dir, &quick_tuning());
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    lock.try_acquire().map(|guard| guard.map(std::mem::forget).is_some())
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        Ok(())
    }

    #[test]
    fn test_busy_lock_degrades_without_blocking() -> Result<()> {
        let temp_dir = tempdir()?;
        let lock = RotationLock::new(&temp_dir.path().join(".locks"), &quick_tuning());

        let _held = lock.try_acquire()?.expect("lock should be free");

        let contender = lock.clone();
        let started = std::time::Instant::now();
        assert!(contender.acquire().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));

        Ok(())
    }

    #[test]
    fn test_stale_lock_is_reclaimed() -> Result<()> {
        let temp_dir = tempdir()?;
        let tuning = EngineTuning {
            lock_stale_after: Duration::from_millis(50),
            ..quick_tuning()
        };
        let lock = RotationLock::new(&temp_dir.path().join(".locks"), &tuning);

        // Simulate a process that crashed while holding the lock
        let abandoned = lock.try_acquire()?.expect("lock should be free");
        std::mem::forget(abandoned);

        assert!(lock.try_acquire()?.is_none());
        thread::sleep(Duration::from_millis(120));

        let guard = lock.try_acquire()?;
        assert!(guard.is_some());

        Ok(())
    }
}
