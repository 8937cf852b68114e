//! logsink: a multi-process-safe rotating log file sink
//!
//! Writes go to `<period>.log` in a shared directory and roll over when the
//! period changes or the file fills up. Closed periods are bundled into
//! `.tar.gz` archives and expired files are deleted by background workers,
//! each elected across processes through a heartbeat-renewed lease. All
//! coordination happens through the filesystem.
//!
//! ```no_run
//! use logsink::{registry, SinkConfig};
//!
//! # fn main() -> logsink::Result<()> {
//! let config = SinkConfig::new()
//!     .with_directory("/var/log/app")
//!     .with_max_size(64 * 1024 * 1024)
//!     .with_retention("14d");
//!
//! let sink = registry::acquire(&config)?;
//! sink.write_line("service started");
//! sink.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod metrics;
pub mod naming;
pub mod registry;
pub mod rotation;
pub mod scheduler;
pub mod sink;
pub mod worker;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ArchiveConfig, EngineTuning, ResolvedConfig, RetentionConfig, RotationConfig, SinkConfig};
pub use error::{Error, Result};
pub use events::{Event, EventLog};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use naming::{Cadence, RetentionWindow, WindowUnit};
pub use registry::SinkHandle;
pub use rotation::{RotatingWriter, RotationReason};
pub use sink::LogSink;
pub use worker::{ArchiveReport, RetentionReport, WorkerKind};
