//! Filesystem locking primitives
//!
//! Two distinct primitives coordinate cooperating processes that share a log
//! directory, with no lock service besides the filesystem itself:
//!
//! - [`RotationLock`]: a short-lived mutex built on atomic directory creation,
//!   held only for the duration of one rotation.
//! - [`WorkerLease`]: a heartbeat-renewed lease record electing the single
//!   process that runs a background worker.
//!
//! Both live under the reserved `.locks` subdirectory of the log directory.

mod rotation;
mod lease;

pub use rotation::{RotationGuard, RotationLock};
pub use lease::{LeaseRecord, WorkerLease};

/// Name of the rotation lock marker directory
pub const ROTATION_LOCK_NAME: &str = "rotation.lock";
