//! Write-time rotation engine
//!
//! A [`RotatingWriter`] owns the open log file of one process. It rotates
//! when the period changes or the file fills up, buffers writes while a
//! rotation is in flight, and replays them in order once the new file is open.

mod destination;
mod state;
mod select;
mod engine;

pub use destination::LogDestination;
pub use engine::RotatingWriter;
pub use select::Capacity;

use std::fmt;
use serde::{Deserialize, Serialize};

/// Why a rotation was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationReason {
    /// The period key changed
    Period,
    /// The current file reached its size limit
    Size,
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period => write!(f, "period"),
            Self::Size => write!(f, "size"),
        }
    }
}
