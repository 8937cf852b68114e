//! Sink facade
//!
//! A [`LogSink`] ties one rotating writer to the archive and retention
//! schedulers of its directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::clock::{self, SharedClock};
use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use crate::events::EventLog;
use crate::metrics::MetricsSnapshot;
use crate::rotation::RotatingWriter;
use crate::scheduler::{WorkerCoordinator, WorkerScheduler};
use crate::worker::{ArchiveReport, ArchiveWorker, RetentionReport, RetentionWorker, WorkerReport};

/// A rotating log sink with its background workers
pub struct LogSink {
    config: ResolvedConfig,
    writer: RotatingWriter,
    events: Arc<EventLog>,
    archive: Option<Arc<WorkerCoordinator>>,
    retention: Option<Arc<WorkerCoordinator>>,
    schedulers: Mutex<Vec<WorkerScheduler>>,
    is_open: RwLock<bool>,
}

impl LogSink {
    /// Open a sink on the system clock
    pub fn open(config: ResolvedConfig) -> Result<Self> {
        Self::with_clock(config, clock::system())
    }

    /// Open a sink on the given clock
    pub fn with_clock(config: ResolvedConfig, clock: SharedClock) -> Result<Self> {
        fs::create_dir_all(&config.directory)?;

        let events = Arc::new(EventLog::new(
            &config.meta_directory(),
            config.rotation.log_events,
            clock.clone(),
        ));
        let writer = RotatingWriter::open(&config, clock.clone(), events.clone())?;
        let lock_dir = config.lock_directory();

        let archive = if config.archive.enabled {
            let worker = ArchiveWorker::new(&config, clock.clone(), events.clone());
            Some(Arc::new(WorkerCoordinator::new(
                Arc::new(worker),
                &lock_dir,
                &config.tuning,
                clock.clone(),
                events.clone(),
            )))
        } else {
            None
        };

        let retention = if config.retention.enabled {
            let worker = RetentionWorker::new(&config, clock.clone(), events.clone());
            Some(Arc::new(WorkerCoordinator::new(
                Arc::new(worker),
                &lock_dir,
                &config.tuning,
                clock.clone(),
                events.clone(),
            )))
        } else {
            None
        };

        let mut schedulers = Vec::new();
        if let Some(ref coordinator) = archive {
            schedulers.push(WorkerScheduler::start(
                Arc::clone(coordinator),
                config.archive.cadence,
                config.archive.run_on_start,
                config.tuning.failover_check_interval,
                clock.clone(),
            )?);
        }
        // Without a window there is nothing to enforce on a schedule
        if let (Some(coordinator), Some(window)) = (&retention, config.retention_window) {
            schedulers.push(WorkerScheduler::start(
                Arc::clone(coordinator),
                window.check_cadence(),
                config.retention.run_on_start,
                config.tuning.failover_check_interval,
                clock.clone(),
            )?);
        }

        info!(
            directory = %config.directory.display(),
            archive = config.archive.enabled,
            retention = ?config.retention_window.map(|w| w.to_string()),
            "log sink opened"
        );

        Ok(Self {
            config,
            writer,
            events,
            archive,
            retention,
            schedulers: Mutex::new(schedulers),
            is_open: RwLock::new(true),
        })
    }

    /// Write a raw payload
    pub fn write(&self, payload: &[u8]) -> bool {
        self.writer.write(payload)
    }

    /// Write one line, appending a newline when missing
    pub fn write_line(&self, line: &str) -> bool {
        if line.ends_with('\n') {
            return self.writer.write(line.as_bytes());
        }

        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
        self.writer.write(&payload)
    }

    /// Wait for any in-flight rotation, then flush to disk
    pub fn flush(&self) -> Result<()> {
        self.writer.flush()
    }

    /// Run the archive worker now, under its lease
    ///
    /// Returns `Ok(None)` when another process holds the lease.
    pub fn run_archive_now(&self) -> Result<Option<ArchiveReport>> {
        self.ensure_open()?;
        let coordinator = self
            .archive
            .as_ref()
            .ok_or_else(|| Error::archive("Archiving is disabled"))?;

        match coordinator.run_once()? {
            Some(WorkerReport::Archive(report)) => Ok(Some(report)),
            Some(other) => Err(Error::scheduler(format!("Unexpected report: {:?}", other))),
            None => Ok(None),
        }
    }

    /// Run the retention worker now, under its lease
    ///
    /// Returns `Ok(None)` when another process holds the lease.
    pub fn run_retention_now(&self) -> Result<Option<RetentionReport>> {
        self.ensure_open()?;
        let coordinator = self
            .retention
            .as_ref()
            .ok_or_else(|| Error::retention("Retention is disabled"))?;

        match coordinator.run_once()? {
            Some(WorkerReport::Retention(report)) => Ok(Some(report)),
            Some(other) => Err(Error::scheduler(format!("Unexpected report: {:?}", other))),
            None => Ok(None),
        }
    }

    /// Stop the schedulers and close the writer
    ///
    /// Worker runs already in flight finish and release their leases.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut is_open = self.is_open.write();
            if !*is_open {
                return Ok(());
            }
            *is_open = false;
        }

        for mut scheduler in self.schedulers.lock().drain(..) {
            scheduler.stop();
        }

        self.writer.close()?;
        info!(directory = %self.config.directory.display(), "log sink closed");
        Ok(())
    }

    /// Check if the sink is open
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Get the resolved configuration
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Get the log directory
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.writer.current_path()
    }

    /// Get current writer metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.writer.metrics()
    }

    /// Metadata event log
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "error closing log sink");
            }
        }
    }
}
