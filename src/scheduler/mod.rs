//! Background scheduling
//!
//! Every process schedules the archive and retention workers independently;
//! the worker lease decides which one actually runs a given tick. A separate
//! failover check takes over leases whose holder stopped heartbeating.

mod task;
mod coordinator;

pub use task::PeriodicTask;
pub use coordinator::{WorkerCoordinator, WorkerScheduler};
