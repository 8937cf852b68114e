//! Period keys, filenames and retention windows
//!
//! Pure functions mapping timestamps to period keys, period keys to log,
//! overflow and archive filenames, and duration strings to retention windows.
//! Nothing in this module touches the filesystem.

mod period;
mod files;
mod window;

pub use period::Cadence;
pub use files::{
    archive_file_name, log_file_name, overflow_file_name, parse_archive_file_name,
    parse_log_file_name, ArchiveFileName, LogFileName, OverflowStamp,
};
pub use window::{RetentionWindow, WindowUnit};

/// Period key type
pub type PeriodKey = String;

/// Separator between a period and its overflow disambiguators.
///
/// `~` sorts after `.` and `-`, so `2024-05-01.log` < `2024-05-01~10-00-00.log`
/// and every overflow file lands after its period's primary file.
pub const SEPARATOR: char = '~';

/// Extension of active and rotated log files
pub const LOG_EXTENSION: &str = "log";

/// Suffix of archive bundles
pub const ARCHIVE_SUFFIX: &str = "-archive.tar.gz";
