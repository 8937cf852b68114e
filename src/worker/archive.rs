use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::ResolvedConfig;
use crate::error::Result;
use crate::events::{Event, EventLog};
use crate::naming::{archive_file_name, Cadence, PeriodKey};
use crate::worker::bundle::{BundleWriter, TarGzBundle};
use crate::worker::{list_log_files, ArchiveReport, Worker, WorkerKind, WorkerReport};

/// Bundles closed periods and deletes the originals
pub struct ArchiveWorker {
    /// Log directory to scan
    directory: PathBuf,
    /// Directory bundles are written to
    archive_directory: PathBuf,
    /// Archive grouping period
    cadence: Cadence,
    /// Compression backend
    bundler: Arc<dyn BundleWriter>,
    clock: SharedClock,
    events: Arc<EventLog>,
}

impl ArchiveWorker {
    /// Create a worker from a configuration snapshot
    pub fn new(config: &ResolvedConfig, clock: SharedClock, events: Arc<EventLog>) -> Self {
        Self {
            directory: config.directory.clone(),
            archive_directory: config.archive_directory.clone(),
            cadence: config.archive.cadence,
            bundler: Arc::new(TarGzBundle::default()),
            clock,
            events,
        }
    }

    /// Replace the compression backend
    pub fn with_bundler(mut self, bundler: Arc<dyn BundleWriter>) -> Self {
        self.bundler = bundler;
        self
    }

    /// Archive every closed period found in the log directory
    pub fn archive(&self) -> Result<ArchiveReport> {
        let current = self.cadence.period_key(&self.clock.now());
        let mut groups: BTreeMap<PeriodKey, Vec<PathBuf>> = BTreeMap::new();

        for (path, name) in list_log_files(&self.directory)? {
            let key = name.period_key(self.cadence);
            // Open periods, including ones a writer with a faster clock
            // already started; keys of one cadence sort in time order
            if key >= current {
                continue;
            }
            groups.entry(key).or_default().push(path);
        }

        let mut report = ArchiveReport::default();
        if groups.is_empty() {
            debug!(directory = %self.directory.display(), "nothing to archive");
            return Ok(report);
        }

        fs::create_dir_all(&self.archive_directory)?;

        for (key, files) in groups {
            if let Err(e) = self.archive_group(&key, &files, &mut report) {
                error!(period = %key, error = %e, "failed to archive period");
                self.events.record(&Event::error("archive", format!("{}: {}", key, e)));
                report.failed_groups += 1;
            }
        }

        info!(
            bundles = report.bundles.len(),
            files = report.archived_files,
            failed = report.failed_groups,
            "archive run complete"
        );
        Ok(report)
    }

    fn archive_group(&self, key: &str, files: &[PathBuf], report: &mut ArchiveReport) -> Result<()> {
        let destination = next_bundle_path(&self.archive_directory, key);
        self.bundler.write_bundle(&destination, files)?;

        // Bundle and originals may coexist if a deletion fails; never rolled back
        let mut deleted = 0;
        for file in files {
            match fs::remove_file(file) {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => deleted += 1,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "archived file could not be deleted");
                    self.events.record(&Event::error(
                        "archive",
                        format!("{} archived into {} but not deleted: {}", file.display(), destination.display(), e),
                    ));
                }
            }
        }

        debug!(period = %key, bundle = %destination.display(), files = files.len(), "period archived");
        self.events.record(&Event::Archive {
            period: key.to_string(),
            bundle: destination.clone(),
            files: files.len(),
        });

        report.archived_files += deleted;
        report.bundles.push(destination);
        Ok(())
    }
}

impl Worker for ArchiveWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Archive
    }

    fn run(&self) -> Result<WorkerReport> {
        self.archive().map(WorkerReport::Archive)
    }
}

/// First bundle name for `key` that does not exist yet
fn next_bundle_path(dir: &Path, key: &str) -> PathBuf {
    let mut index = 0;
    loop {
        let candidate = dir.join(archive_file_name(key, index));
        if !candidate.exists() {
            return candidate;
        }
        index += 1;
    }
}
