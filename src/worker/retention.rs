use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::events::{Event, EventLog};
use crate::naming::{parse_archive_file_name, Cadence, RetentionWindow};
use crate::worker::{list_log_files, RetentionReport, Worker, WorkerKind, WorkerReport};

/// Deletes log files and bundles older than the retention window
pub struct RetentionWorker {
    /// Log directory to scan
    directory: PathBuf,
    /// Bundle directory to scan
    archive_directory: PathBuf,
    /// Rotation period, used to protect the open file
    rotation_cadence: Cadence,
    /// Retention window; `None` keeps everything
    window: Option<RetentionWindow>,
    clock: SharedClock,
    events: Arc<EventLog>,
}

impl RetentionWorker {
    /// Create a worker from a configuration snapshot
    pub fn new(config: &ResolvedConfig, clock: SharedClock, events: Arc<EventLog>) -> Self {
        Self {
            directory: config.directory.clone(),
            archive_directory: config.archive_directory.clone(),
            rotation_cadence: config.rotation.cadence,
            window: config.retention_window,
            clock,
            events,
        }
    }

    /// Delete everything whose period started before the cutoff
    pub fn sweep(&self) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();
        let window = match self.window {
            Some(window) => window,
            None => {
                debug!("no retention window configured, keeping all files");
                return Ok(report);
            }
        };

        let now = self.clock.now();
        let cutoff = window.cutoff(&now);
        let current = self.rotation_cadence.period_key(&now);

        for (path, name) in list_log_files(&self.directory)? {
            let key = name.period_key(self.rotation_cadence);
            if key == current {
                continue;
            }
            let started = self.rotation_cadence.period_start(&name.timestamp());
            if started < cutoff {
                self.delete(&path, cutoff, &mut report);
            }
        }

        for (path, started) in list_archives(&self.archive_directory)? {
            if started < cutoff {
                self.delete(&path, cutoff, &mut report);
            }
        }

        info!(
            window = %window,
            cutoff = %cutoff,
            deleted = report.deleted.len(),
            failed = report.failed,
            "retention run complete"
        );
        Ok(report)
    }

    fn delete(&self, path: &Path, cutoff: DateTime<Utc>, report: &mut RetentionReport) {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "expired file deleted");
                self.events.record(&Event::Retention {
                    path: path.to_path_buf(),
                    cutoff,
                });
                report.deleted.push(path.to_path_buf());
            }
            // Someone else got there first
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "expired file could not be deleted");
                self.events
                    .record(&Event::error("retention", format!("{}: {}", path.display(), e)));
                report.failed += 1;
            }
        }
    }
}

impl Worker for RetentionWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Retention
    }

    fn run(&self) -> Result<WorkerReport> {
        self.sweep().map(WorkerReport::Retention)
    }
}

/// Bundles in `dir` with their period start
fn list_archives(dir: &Path) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(parsed) = entry.file_name().to_str().and_then(parse_archive_file_name) {
            archives.push((entry.path(), parsed.timestamp));
        }
    }

    archives.sort();
    Ok(archives)
}
