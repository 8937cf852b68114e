//! Background workers
//!
//! Archive and retention workers run once per invocation, off the write path,
//! under the worker lease for their kind. Per-item failures are logged and
//! skipped; only a failure to list the directory aborts a run.

mod bundle;
mod archive;
mod retention;

pub use bundle::{BundleWriter, TarGzBundle};
pub use archive::ArchiveWorker;
pub use retention::RetentionWorker;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::naming::{parse_log_file_name, LogFileName};

/// Kind of background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Archive,
    Retention,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Retention => write!(f, "retention"),
        }
    }
}

/// Outcome of one archive run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    /// Bundles written, in period order
    pub bundles: Vec<PathBuf>,
    /// Original log files deleted after bundling
    pub archived_files: usize,
    /// Groups that could not be bundled
    pub failed_groups: usize,
}

/// Outcome of one retention run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    /// Files deleted
    pub deleted: Vec<PathBuf>,
    /// Files that were expired but could not be deleted
    pub failed: usize,
}

/// Outcome of any worker run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerReport {
    Archive(ArchiveReport),
    Retention(RetentionReport),
}

/// A job the scheduler can run under a worker lease
pub trait Worker: Send + Sync {
    /// Kind used to name the lease
    fn kind(&self) -> WorkerKind;

    /// Run one complete pass
    fn run(&self) -> Result<WorkerReport>;
}

/// List top-level log files in `dir`, sorted by filename
///
/// Subdirectories and anything that does not parse as a log filename are
/// ignored. A missing directory has no log files.
pub(crate) fn list_log_files(dir: &Path) -> Result<Vec<(PathBuf, LogFileName)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(parsed) = name.to_str().and_then(parse_log_file_name) {
            files.push((entry.path(), parsed));
        }
    }

    files.sort_by(|a, b| a.1.name.cmp(&b.1.name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_log_files_skips_foreign_entries() -> Result<()> {
        let temp_dir = tempdir()?;
        let dir = temp_dir.path();

        fs::write(dir.join("2024-01-02~10-00-00.log"), b"b")?;
        fs::write(dir.join("2024-01-02.log"), b"a")?;
        fs::write(dir.join("notes.txt"), b"x")?;
        fs::create_dir_all(dir.join("archives"))?;
        fs::create_dir_all(dir.join("2024-01-03.log"))?;
        fs::write(dir.join("archives").join("2024-01-01.log"), b"nested")?;

        let names: Vec<_> = list_log_files(dir)?.into_iter().map(|(_, f)| f.name).collect();
        assert_eq!(names, vec!["2024-01-02.log", "2024-01-02~10-00-00.log"]);

        assert!(list_log_files(&dir.join("missing"))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_worker_kind_names() {
        assert_eq!(WorkerKind::Archive.to_string(), "archive");
        assert_eq!(WorkerKind::Retention.to_string(), "retention");
        assert_eq!(serde_json::to_string(&WorkerKind::Retention).unwrap(), "\"retention\"");
    }
}
