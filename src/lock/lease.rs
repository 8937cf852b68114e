//! Worker lease
//!
//! A lease record is a small JSON file per (directory, worker kind). The
//! holder rewrites its heartbeat periodically; a record whose heartbeat is
//! older than the staleness threshold may be taken over by any process.
//! Election is best-effort: two processes that detect the same stale record
//! within one heartbeat window can both believe they won until the next
//! renewal tells one of them otherwise.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::worker::WorkerKind;

/// Persisted lease record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Process id of the holder
    pub owner_pid: u32,
    /// Unique id of the holding lease instance
    pub owner_id: Uuid,
    /// When the holder won the election
    pub started_at: DateTime<Utc>,
    /// Last heartbeat written by the holder
    pub last_heartbeat: DateTime<Utc>,
    /// Number of times this lease has been (re)acquired
    pub attempt: u32,
}

/// Heartbeat-renewed claim on one worker kind for one directory
pub struct WorkerLease {
    /// Lease record path
    path: PathBuf,
    /// Worker kind this lease elects
    kind: WorkerKind,
    /// Identity written into records we own
    owner_id: Uuid,
    /// Heartbeat age after which a record is abandoned
    stale_after: ChronoDuration,
    /// Wall-clock source
    clock: SharedClock,
}

impl WorkerLease {
    /// Create a lease handle for `kind` living in `lock_dir`
    pub fn new(lock_dir: &Path, kind: WorkerKind, stale_after: Duration, clock: SharedClock) -> Self {
        Self {
            path: lock_dir.join(format!("{}.lease.json", kind)),
            kind,
            owner_id: Uuid::new_v4(),
            stale_after: ChronoDuration::from_std(stale_after).unwrap_or_else(|_| ChronoDuration::days(365)),
            clock,
        }
    }

    /// Path of the lease record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Worker kind this lease elects
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Identity of this lease handle
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    /// Read the current record, if any
    pub fn read(&self) -> Result<Option<LeaseRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `record` has missed its heartbeat for too long
    pub fn is_expired(&self, record: &LeaseRecord) -> bool {
        self.clock.now() - record.last_heartbeat > self.stale_after
    }

    /// Whether a record exists and has gone stale
    pub fn holder_is_stale(&self) -> Result<bool> {
        match self.read() {
            Ok(Some(record)) => Ok(self.is_expired(&record)),
            Ok(None) => Ok(false),
            // An unreadable record can never be renewed by its writer either
            Err(Error::Serialization(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Whether this handle currently owns the record on disk
    pub fn is_held(&self) -> Result<bool> {
        Ok(self.read()?.map_or(false, |r| r.owner_id == self.owner_id))
    }

    /// Try to win the election
    ///
    /// Returns `None` when another live process holds the lease.
    pub fn acquire(&self) -> Result<Option<LeaseRecord>> {
        let previous = match self.read() {
            Ok(record) => record,
            Err(Error::Serialization(e)) => {
                warn!(kind = %self.kind, error = %e, "discarding unreadable lease record");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(mut record) = previous.clone().filter(|r| r.owner_id == self.owner_id) {
            // Already ours: keep the run's start and attempt count
            record.last_heartbeat = self.clock.now();
            self.write(&record)?;
            return Ok(Some(record));
        }

        if let Some(ref record) = previous {
            if !self.is_expired(record) {
                debug!(kind = %self.kind, owner_pid = record.owner_pid, "lease held by a live process");
                return Ok(None);
            }
            info!(
                kind = %self.kind,
                stale_owner_pid = record.owner_pid,
                attempt = record.attempt,
                "taking over stale lease"
            );
        }

        let now = self.clock.now();
        let record = LeaseRecord {
            owner_pid: std::process::id(),
            owner_id: self.owner_id,
            started_at: now,
            last_heartbeat: now,
            attempt: previous.map_or(1, |r| r.attempt.saturating_add(1)),
        };
        self.write(&record)?;

        // Another process may have written between our read and our rename
        match self.read()? {
            Some(current) if current.owner_id == self.owner_id => Ok(Some(current)),
            _ => Ok(None),
        }
    }

    /// Rewrite the heartbeat
    ///
    /// Returns `false` when the record no longer belongs to this handle, in
    /// which case the lease is lost and must not be renewed again.
    pub fn renew(&self) -> Result<bool> {
        let mut record = match self.read()? {
            Some(record) if record.owner_id == self.owner_id => record,
            _ => {
                warn!(kind = %self.kind, "lease lost to another process");
                return Ok(false);
            }
        };

        record.last_heartbeat = self.clock.now();
        self.write(&record)?;
        Ok(true)
    }

    /// Delete the record if this handle owns it
    pub fn release(&self) -> Result<()> {
        match self.read() {
            Ok(Some(record)) if record.owner_id == self.owner_id => {}
            Ok(_) => return Ok(()),
            Err(Error::Serialization(_)) => return Ok(()),
            Err(e) => return Err(e),
        }

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::lease(format!(
                "Failed to remove lease {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    /// Write a record through a temporary sibling and an atomic rename
    fn write(&self, record: &LeaseRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension(format!("{}.tmp", self.owner_id.simple()));
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::lease(format!("Failed to write lease {}: {}", self.path.display(), e))
        })
    }
}
