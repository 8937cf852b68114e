//! Process-wide sink registry
//!
//! Every handle acquired for the same directory shares one [`LogSink`], so a
//! process never runs two writers or two sets of schedulers against one
//! directory. The sink is shut down when the last handle is dropped.

use std::collections::HashMap;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::SinkConfig;
use crate::error::Result;
use crate::sink::LogSink;

struct Entry {
    sink: Arc<LogSink>,
    handles: usize,
}

fn sinks() -> &'static Mutex<HashMap<PathBuf, Entry>> {
    static SINKS: OnceLock<Mutex<HashMap<PathBuf, Entry>>> = OnceLock::new();
    SINKS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get a handle on the sink for `config`'s directory, opening it if needed
///
/// When a sink is already open for the directory, the existing one is shared
/// and `config` is only validated.
pub fn acquire(config: &SinkConfig) -> Result<SinkHandle> {
    let resolved = config.resolve()?;
    fs::create_dir_all(&resolved.directory)?;
    let key = fs::canonicalize(&resolved.directory)?;

    let mut sinks = sinks().lock();
    if let Some(entry) = sinks.get_mut(&key) {
        if entry.sink.config() != &resolved {
            warn!(directory = %key.display(), "sink already open with a different configuration, sharing it");
        }
        entry.handles += 1;
        return Ok(SinkHandle {
            key,
            sink: Arc::clone(&entry.sink),
        });
    }

    let sink = Arc::new(LogSink::open(resolved)?);
    sinks.insert(
        key.clone(),
        Entry {
            sink: Arc::clone(&sink),
            handles: 1,
        },
    );
    debug!(directory = %key.display(), "sink registered");

    Ok(SinkHandle { key, sink })
}

/// Number of directories with an open sink in this process
pub fn open_sinks() -> usize {
    sinks().lock().len()
}

/// Shared, reference-counted access to a registered sink
pub struct SinkHandle {
    key: PathBuf,
    sink: Arc<LogSink>,
}

impl SinkHandle {
    /// Canonical directory this handle is registered under
    pub fn key(&self) -> &Path {
        &self.key
    }
}

impl Deref for SinkHandle {
    type Target = LogSink;

    fn deref(&self) -> &LogSink {
        &self.sink
    }
}

impl Clone for SinkHandle {
    fn clone(&self) -> Self {
        if let Some(entry) = sinks().lock().get_mut(&self.key) {
            entry.handles += 1;
        }
        Self {
            key: self.key.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        let released = {
            let mut sinks = sinks().lock();
            let remaining = sinks.get_mut(&self.key).map(|entry| {
                entry.handles = entry.handles.saturating_sub(1);
                entry.handles
            });
            match remaining {
                Some(0) => sinks.remove(&self.key),
                _ => None,
            }
        };

        if let Some(entry) = released {
            debug!(directory = %self.key.display(), "last handle dropped, closing sink");
            if let Err(e) = entry.sink.shutdown() {
                warn!(directory = %self.key.display(), error = %e, "error closing sink");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> SinkConfig {
        SinkConfig::new()
            .with_directory(dir)
            .with_archive_on_start(false)
            .with_retention_on_start(false)
    }

    #[test]
    fn test_handles_share_one_sink() -> Result<()> {
        let temp_dir = tempdir()?;

        let first = acquire(&config(temp_dir.path()))?;
        // A different spelling of the same directory
        let second = acquire(&config(&temp_dir.path().join(".")))?;
        let third = second.clone();

        assert_eq!(first.key(), second.key());
        assert!(std::ptr::eq(&*first, &*third));

        first.write_line("shared");
        drop(first);
        drop(second);
        assert!(third.is_open());

        third.flush()?;
        let sink: &LogSink = &third;
        let path = sink.current_path();
        drop(third);

        assert_eq!(fs::read_to_string(path)?, "shared\n");
        Ok(())
    }

    #[test]
    fn test_last_handle_closes_sink() -> Result<()> {
        let temp_dir = tempdir()?;

        let handle = acquire(&config(temp_dir.path()))?;
        let sink = Arc::clone(&handle.sink);
        drop(handle);

        assert!(!sink.is_open());

        // A new handle opens a fresh sink
        let handle = acquire(&config(temp_dir.path()))?;
        assert!(handle.is_open());
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected_before_registration() {
        let temp_dir = tempdir().unwrap();
        let err = acquire(&config(temp_dir.path()).with_max_size(0)).err().unwrap();
        assert!(err.is_config_error());
    }
}
