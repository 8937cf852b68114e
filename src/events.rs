//! Metadata event log
//!
//! An optional, append-only record of rotation, archive, retention and error
//! events: one JSON object per line in per-kind dated files under `.meta/`.
//! The engine never reads these files back.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::clock::SharedClock;
use crate::rotation::RotationReason;

/// An observable engine event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Event {
    /// The active file changed
    Rotation {
        reason: RotationReason,
        from: PathBuf,
        to: PathBuf,
        /// Rotation ran without the rotation lock
        degraded: bool,
    },
    /// A closed period was bundled
    Archive {
        period: String,
        bundle: PathBuf,
        files: usize,
    },
    /// An expired file was deleted
    Retention {
        path: PathBuf,
        cutoff: DateTime<Utc>,
    },
    /// A non-fatal runtime failure
    Error {
        context: String,
        message: String,
    },
}

impl Event {
    /// Kind name, also used as the file prefix
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rotation { .. } => "rotation",
            Self::Archive { .. } => "archive",
            Self::Retention { .. } => "retention",
            Self::Error { .. } => "error",
        }
    }

    /// Create an error event
    pub fn error(context: impl Into<String>, message: impl ToString) -> Self {
        Self::Error {
            context: context.into(),
            message: message.to_string(),
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    timestamp: DateTime<Utc>,
    pid: u32,
    #[serde(flatten)]
    event: &'a Event,
}

/// Writer for the metadata event log
pub struct EventLog {
    /// Directory holding the event files
    directory: PathBuf,
    /// Whether events are written at all
    enabled: bool,
    /// Wall-clock source
    clock: SharedClock,
    /// Serializes appends from this process
    write_lock: Mutex<()>,
}

impl EventLog {
    /// Create an event log writing into `directory`
    pub fn new(directory: &Path, enabled: bool, clock: SharedClock) -> Self {
        Self {
            directory: directory.to_path_buf(),
            enabled,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether events are written
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the file an event of `kind` recorded at `at` goes to
    pub fn path_for(&self, kind: &str, at: &DateTime<Utc>) -> PathBuf {
        self.directory
            .join(format!("{}-{}.jsonl", kind, at.format("%Y-%m-%d")))
    }

    /// Append an event; failures are logged and swallowed
    pub fn record(&self, event: &Event) {
        if !self.enabled {
            return;
        }

        if let Err(e) = self.append(event) {
            warn!(kind = event.kind(), error = %e, "failed to record metadata event");
        }
    }

    fn append(&self, event: &Event) -> crate::Result<()> {
        let timestamp = self.clock.now();
        let line = EventLine {
            timestamp,
            pid: std::process::id(),
            event,
        };
        let mut bytes = serde_json::to_vec(&line)?;
        bytes.push(b'\n');

        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.directory)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(event.kind(), &timestamp))?;
        file.write_all(&bytes)?;

        Ok(())
    }
}
