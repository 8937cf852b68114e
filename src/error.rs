//! Error handling for logsink
//!
//! This module provides error types and result aliases for sink operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in logsink operations
#[derive(Error, Debug)]
pub enum Error {
    /// Errors related to configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to period keys, filenames and durations
    #[error("Naming error: {0}")]
    Naming(String),

    /// Errors related to the rotation lock
    #[error("Lock error for {path:?}: {message}")]
    Lock {
        path: PathBuf,
        message: String,
    },

    /// Errors related to worker leases
    #[error("Lease error: {0}")]
    Lease(String),

    /// Errors related to archiving
    #[error("Archive error: {0}")]
    Archive(String),

    /// Errors related to retention
    #[error("Retention error: {0}")]
    Retention(String),

    /// Errors related to background scheduling
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// The sink has been shut down
    #[error("Sink is closed")]
    Closed,

    /// Generic error type for other cases
    #[error("{0}")]
    Other(String),
}

/// Result type for logsink operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new naming error
    pub fn naming(message: impl Into<String>) -> Self {
        Self::Naming(message.into())
    }

    /// Create a new lock error
    pub fn lock(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Lock {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new lease error
    pub fn lease(message: impl Into<String>) -> Self {
        Self::Lease(message.into())
    }

    /// Create a new archive error
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    /// Create a new retention error
    pub fn retention(message: impl Into<String>) -> Self {
        Self::Retention(message.into())
    }

    /// Create a new scheduler error
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler(message.into())
    }

    /// Create a new generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is an I/O error
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Check if this is a naming error
    pub fn is_naming_error(&self) -> bool {
        matches!(self, Self::Naming(_))
    }

    /// Check if the underlying I/O error is a missing file
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }

    /// Get a user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Config(_) => Some("Check the sink configuration: retention must cover the archive cadence, which must cover the rotation cadence".to_string()),
            Self::Io(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                Some("Verify permissions on the log directory".to_string())
            }
            Self::Lock { .. } => Some("A stale lock directory can be removed once no process is rotating".to_string()),
            _ => None,
        }
    }
}
