//! Configuration for logsink
//!
//! This module provides configuration options for the rotating sink, its
//! archive and retention workers, and the timing constants of the engine.
//! A [`SinkConfig`] is validated once, eagerly, by [`SinkConfig::resolve`];
//! an invalid configuration never starts a sink.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::naming::{Cadence, RetentionWindow};

/// Name of the reserved subdirectory holding lock artifacts and lease records
pub const LOCK_DIR_NAME: &str = ".locks";

/// Name of the reserved subdirectory holding the metadata event log
pub const META_DIR_NAME: &str = ".meta";

/// Rotation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Maximum size of a single log file in bytes
    pub max_size: u64,
    /// Rotation period (hourly or daily)
    pub cadence: Cadence,
    /// Whether to record rotation events in the metadata log
    pub log_events: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10MB
            cadence: Cadence::Day,
            log_events: true,
        }
    }
}

/// Archive settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Whether completed periods are archived
    pub enabled: bool,
    /// Output directory, relative to the log directory unless absolute
    pub directory: PathBuf,
    /// Archive grouping period
    pub cadence: Cadence,
    /// Run the archive worker once when the sink starts
    pub run_on_start: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("archives"),
            cadence: Cadence::Day,
            run_on_start: true,
        }
    }
}

/// Retention settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Whether expired logs and archives are deleted
    pub enabled: bool,
    /// Duration string such as `"7d"`; `None` deletes nothing
    pub duration: Option<String>,
    /// Run the retention worker once when the sink starts
    pub run_on_start: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: None,
            run_on_start: true,
        }
    }
}

/// Timing constants of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Fraction of `max_size` at which a sampled file counts as full
    pub overflow_threshold: f64,
    /// Shortest delay between disk size samples
    pub min_check_interval: Duration,
    /// Longest delay between disk size samples
    pub max_check_interval: Duration,
    /// Delay before the first disk size sample
    pub initial_check_interval: Duration,
    /// Delay between rotation lock attempts
    pub lock_retry_delay: Duration,
    /// Number of rotation lock attempts before degrading
    pub lock_retry_attempts: u32,
    /// Age after which a rotation lock is considered abandoned
    pub lock_stale_after: Duration,
    /// Heartbeat age after which a worker lease is considered abandoned
    pub lease_stale_after: Duration,
    /// Interval between lease heartbeats
    pub heartbeat_interval: Duration,
    /// Interval between stale lease checks
    pub failover_check_interval: Duration,
    /// Upper bound on rotations while draining buffered writes
    pub max_rotations_per_drain: u32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            overflow_threshold: 0.98,
            min_check_interval: Duration::from_millis(50),
            max_check_interval: Duration::from_secs(2),
            initial_check_interval: Duration::from_millis(500),
            lock_retry_delay: Duration::from_millis(20),
            lock_retry_attempts: 50,
            lock_stale_after: Duration::from_secs(10),
            lease_stale_after: Duration::from_secs(20),
            heartbeat_interval: Duration::from_secs(5),
            failover_check_interval: Duration::from_secs(10),
            max_rotations_per_drain: 8,
        }
    }
}

/// Configuration options for a sink
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Log directory (required)
    pub directory: Option<PathBuf>,
    /// Rotation settings
    pub rotation: RotationConfig,
    /// Archive settings
    pub archive: ArchiveConfig,
    /// Retention settings
    pub retention: RetentionConfig,
    /// Engine timing constants
    pub tuning: EngineTuning,
}

impl SinkConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log directory
    pub fn with_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the maximum size of a log file
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.rotation.max_size = max_size;
        self
    }

    /// Set the rotation cadence
    pub fn with_rotation_cadence(mut self, cadence: Cadence) -> Self {
        self.rotation.cadence = cadence;
        self
    }

    /// Set whether rotation events are recorded
    pub fn with_rotation_events(mut self, enabled: bool) -> Self {
        self.rotation.log_events = enabled;
        self
    }

    /// Enable or disable archiving
    pub fn with_archive_enabled(mut self, enabled: bool) -> Self {
        self.archive.enabled = enabled;
        self
    }

    /// Set the archive output directory
    pub fn with_archive_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.archive.directory = path.as_ref().to_path_buf();
        self
    }

    /// Set the archive cadence
    pub fn with_archive_cadence(mut self, cadence: Cadence) -> Self {
        self.archive.cadence = cadence;
        self
    }

    /// Set whether the archive worker runs at startup
    pub fn with_archive_on_start(mut self, run: bool) -> Self {
        self.archive.run_on_start = run;
        self
    }

    /// Enable retention with a duration string such as `"7d"`
    pub fn with_retention(mut self, duration: impl Into<String>) -> Self {
        self.retention.enabled = true;
        self.retention.duration = Some(duration.into());
        self
    }

    /// Enable or disable retention
    pub fn with_retention_enabled(mut self, enabled: bool) -> Self {
        self.retention.enabled = enabled;
        self
    }

    /// Set whether the retention worker runs at startup
    pub fn with_retention_on_start(mut self, run: bool) -> Self {
        self.retention.run_on_start = run;
        self
    }

    /// Replace the engine timing constants
    pub fn with_tuning(mut self, tuning: EngineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Validate the configuration and freeze it
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let directory = self
            .directory
            .clone()
            .ok_or_else(|| Error::config("Log directory is required"))?;

        if directory.as_os_str().is_empty() {
            return Err(Error::config("Log directory must not be empty"));
        }

        if self.rotation.max_size == 0 {
            return Err(Error::config("Maximum file size must be greater than zero"));
        }

        if !self.rotation.cadence.is_rotation_cadence() {
            return Err(Error::config(format!(
                "Rotation cadence must be hourly or daily, got {}",
                self.rotation.cadence
            )));
        }

        if self.archive.enabled {
            if self.archive.directory.as_os_str().is_empty() {
                return Err(Error::config("Archive directory must not be empty"));
            }
            if self.archive.cadence.nominal() < self.rotation.cadence.nominal() {
                return Err(Error::config(format!(
                    "Archive cadence ({}) must not be finer than rotation cadence ({})",
                    self.archive.cadence, self.rotation.cadence
                )));
            }
        }

        let retention_window = match (&self.retention.duration, self.retention.enabled) {
            (Some(duration), true) => Some(RetentionWindow::parse(duration)?),
            _ => None,
        };

        if let Some(window) = retention_window {
            let (floor, what) = if self.archive.enabled {
                (self.archive.cadence, "archive")
            } else {
                (self.rotation.cadence, "rotation")
            };
            if window.nominal() < floor.nominal() {
                return Err(Error::config(format!(
                    "Retention duration ({}) must cover the {} cadence ({})",
                    window, what, floor
                )));
            }
        }

        let tuning = &self.tuning;
        if !(tuning.overflow_threshold > 0.0 && tuning.overflow_threshold <= 1.0) {
            return Err(Error::config("Overflow threshold must be in (0, 1]"));
        }
        if tuning.min_check_interval > tuning.max_check_interval {
            return Err(Error::config("Minimum check interval exceeds the maximum"));
        }
        if tuning.heartbeat_interval >= tuning.lease_stale_after {
            return Err(Error::config("Lease heartbeat must be shorter than the staleness threshold"));
        }

        let archive_directory = directory.join(&self.archive.directory);

        Ok(ResolvedConfig {
            directory,
            archive_directory,
            rotation: self.rotation.clone(),
            archive: self.archive.clone(),
            retention: self.retention.clone(),
            retention_window,
            tuning: self.tuning.clone(),
        })
    }

    /// Create a human-readable string representation of the configuration
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Sink Configuration ===\n\n");

        if let Some(ref dir) = self.directory {
            result.push_str(&format!("Directory: {:?}\n", dir));
        }

        result.push_str("\nRotation:\n");
        result.push_str(&format!("  Max Size: {} bytes\n", self.rotation.max_size));
        result.push_str(&format!("  Cadence: {}\n", self.rotation.cadence));
        result.push_str(&format!("  Log Events: {}\n", self.rotation.log_events));

        result.push_str("\nArchive:\n");
        result.push_str(&format!("  Enabled: {}\n", self.archive.enabled));
        result.push_str(&format!("  Directory: {:?}\n", self.archive.directory));
        result.push_str(&format!("  Cadence: {}\n", self.archive.cadence));
        result.push_str(&format!("  Run On Start: {}\n", self.archive.run_on_start));

        result.push_str("\nRetention:\n");
        result.push_str(&format!("  Enabled: {}\n", self.retention.enabled));
        match self.retention.duration {
            Some(ref duration) => result.push_str(&format!("  Duration: {}\n", duration)),
            None => result.push_str("  Duration: none\n"),
        }
        result.push_str(&format!("  Run On Start: {}\n", self.retention.run_on_start));

        result
    }
}

/// A validated, immutable configuration snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// Log directory
    pub directory: PathBuf,
    /// Archive output directory
    pub archive_directory: PathBuf,
    /// Rotation settings
    pub rotation: RotationConfig,
    /// Archive settings
    pub archive: ArchiveConfig,
    /// Retention settings
    pub retention: RetentionConfig,
    /// Parsed retention window, if retention is active
    pub retention_window: Option<RetentionWindow>,
    /// Engine timing constants
    pub tuning: EngineTuning,
}

impl ResolvedConfig {
    /// Directory holding lock artifacts and lease records
    pub fn lock_directory(&self) -> PathBuf {
        self.directory.join(LOCK_DIR_NAME)
    }

    /// Directory holding the metadata event log
    pub fn meta_directory(&self) -> PathBuf {
        self.directory.join(META_DIR_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SinkConfig::default();

        assert_eq!(config.rotation.max_size, 10 * 1024 * 1024);
        assert_eq!(config.rotation.cadence, Cadence::Day);
        assert!(config.rotation.log_events);
        assert!(config.archive.enabled);
        assert_eq!(config.archive.cadence, Cadence::Day);
        assert!(config.retention.enabled);
        assert_eq!(config.retention.duration, None);

        // A directory is the only required setting
        assert!(config.resolve().unwrap_err().is_config_error());
        assert!(config.with_directory("/var/log/app").resolve().is_ok());
    }

    #[test]
    fn test_config_builder() -> Result<()> {
        let resolved = SinkConfig::new()
            .with_directory("/var/log/app")
            .with_max_size(4096)
            .with_rotation_cadence(Cadence::Hour)
            .with_archive_cadence(Cadence::Week)
            .with_archive_directory("old")
            .with_retention("30d")
            .resolve()?;

        assert_eq!(resolved.rotation.max_size, 4096);
        assert_eq!(resolved.archive_directory, PathBuf::from("/var/log/app/old"));
        assert_eq!(resolved.retention_window, Some(RetentionWindow::parse("30d")?));
        assert_eq!(resolved.lock_directory(), PathBuf::from("/var/log/app/.locks"));
        assert_eq!(resolved.meta_directory(), PathBuf::from("/var/log/app/.meta"));

        Ok(())
    }

    #[test]
    fn test_cadence_ordering_is_enforced() {
        let base = SinkConfig::new().with_directory("/var/log/app");

        // Archive finer than rotation
        let err = base
            .clone()
            .with_rotation_cadence(Cadence::Day)
            .with_archive_cadence(Cadence::Hour)
            .resolve()
            .unwrap_err();
        assert!(err.is_config_error());

        // Retention shorter than archive cadence
        let err = base
            .clone()
            .with_archive_cadence(Cadence::Month)
            .with_retention("1w")
            .resolve()
            .unwrap_err();
        assert!(err.is_config_error());

        // Retention shorter than rotation cadence when archiving is off
        let err = base
            .clone()
            .with_archive_enabled(false)
            .with_retention("12h")
            .resolve()
            .unwrap_err();
        assert!(err.is_config_error());

        assert!(base.clone().with_archive_cadence(Cadence::Month).with_retention("1m").resolve().is_ok());
        assert!(base.clone().with_rotation_cadence(Cadence::Hour).with_archive_cadence(Cadence::Hour).resolve().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let base = SinkConfig::new().with_directory("/var/log/app");

        let invalid_configs = vec![
            base.clone().with_max_size(0),
            base.clone().with_rotation_cadence(Cadence::Week),
            base.clone().with_retention("seven days"),
            base.clone().with_retention("0d"),
            base.clone().with_archive_directory(""),
            SinkConfig::new().with_directory(""),
        ];

        for config in invalid_configs {
            assert!(config.resolve().is_err(), "{:?} should be rejected", config);
        }

        // Disabled retention ignores the duration entirely
        let mut config = base.with_retention("nonsense");
        config.retention.enabled = false;
        assert_eq!(config.resolve().unwrap().retention_window, None);
    }

    #[test]
    fn test_config_deserialize() -> Result<()> {
        let config: SinkConfig = serde_json::from_str(
            r#"{
                "directory": "/var/log/app",
                "rotation": { "max_size": 2048, "cadence": "hourly" },
                "archive": { "cadence": "daily", "directory": "bundles" },
                "retention": { "enabled": true, "duration": "14d" }
            }"#,
        )?;

        assert_eq!(config.rotation.cadence, Cadence::Hour);
        assert!(config.rotation.log_events);
        assert_eq!(config.archive.directory, PathBuf::from("bundles"));
        assert_eq!(config.tuning, EngineTuning::default());
        assert!(config.resolve().is_ok());

        Ok(())
    }

    #[test]
    fn test_config_pretty_string() {
        let pretty = SinkConfig::new().with_retention("7d").to_string_pretty();

        assert!(pretty.contains("Rotation:"));
        assert!(pretty.contains("Archive:"));
        assert!(pretty.contains("Retention:"));
        assert!(pretty.contains("Duration: 7d"));
        assert!(pretty.contains(&format!("Cadence: {}", Cadence::Day)));
    }
}
