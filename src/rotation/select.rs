use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::naming::{log_file_name, overflow_file_name, Cadence, OverflowStamp};
use crate::worker::list_log_files;

/// Highest numeric disambiguator tried for one millisecond
const MAX_OVERFLOW_COUNTER: u32 = 9_999;

/// Size limits of a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    /// Configured maximum size
    pub max_size: u64,
    /// Size at which a sampled file counts as full
    pub full_at: u64,
}

impl Capacity {
    /// Derive limits from `max_size` and the overflow threshold fraction
    pub fn new(max_size: u64, threshold: f64) -> Self {
        let full_at = ((max_size as f64) * threshold).ceil() as u64;
        Self {
            max_size,
            full_at: full_at.clamp(1, max_size.max(1)),
        }
    }

    /// Whether a file of `size` bytes can take `incoming` more
    ///
    /// An empty file always accepts one write, however large.
    pub fn has_room(&self, size: u64, incoming: u64) -> bool {
        size == 0 || (size < self.full_at && size.saturating_add(incoming) <= self.max_size)
    }
}

/// Pick and pre-create the file a rotation switches to
///
/// The period's primary file is only a candidate while the period has no
/// overflow file yet. After that, the newest overflow file is reused if it
/// has room, otherwise a freshly stamped overflow file is created. A file
/// whose name sorts before `previous` is never returned, so lexical file
/// order follows write order.
pub(crate) fn select_next_file(
    dir: &Path,
    period_key: &str,
    cadence: Cadence,
    now: &DateTime<Utc>,
    capacity: Capacity,
    incoming: u64,
    previous: Option<&Path>,
) -> Result<PathBuf> {
    let not_before_previous = |path: &Path| match previous {
        Some(previous) => path.file_name() >= previous.file_name(),
        None => true,
    };

    let newest_overflow = list_log_files(dir)?
        .into_iter()
        .filter(|(_, name)| name.overflow && name.period_key(cadence) == period_key)
        .last();

    match newest_overflow {
        Some((path, _)) => {
            if not_before_previous(&path) && capacity.has_room(file_len(&path)?, incoming) {
                debug!(path = %path.display(), "reusing overflow file");
                return Ok(path);
            }
        }
        None => {
            let primary = dir.join(log_file_name(period_key));
            if not_before_previous(&primary) && capacity.has_room(file_len(&primary)?, incoming) {
                touch(&primary)?;
                return Ok(primary);
            }
        }
    }

    let stamps = [OverflowStamp::Seconds, OverflowStamp::Millis]
        .into_iter()
        .chain((1..=MAX_OVERFLOW_COUNTER).map(OverflowStamp::Counter));

    for stamp in stamps {
        let path = dir.join(overflow_file_name(period_key, now, stamp));
        if !not_before_previous(&path) {
            continue;
        }
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::naming(format!(
        "No usable overflow filename for period {} at {}",
        period_key, now
    )))
}

fn file_len(path: &Path) -> Result<u64> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Create `path` if missing without truncating it
fn touch(path: &Path) -> Result<()> {
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}
