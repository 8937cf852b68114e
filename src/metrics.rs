use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use serde::Serialize;

/// Counters for one rotating writer
#[derive(Debug)]
pub struct EngineMetrics {
    /// Number of accepted writes
    writes: AtomicU64,
    /// Total payload bytes appended
    bytes_written: AtomicU64,
    /// Writes queued while a rotation was in progress
    buffered_writes: AtomicU64,
    /// Rotations that switched files
    rotations: AtomicU64,
    /// Rotations abandoned after re-validation
    aborted_rotations: AtomicU64,
    /// Rotations that ran without the rotation lock
    degraded_rotations: AtomicU64,
    /// Failed appends, flushes or reopens
    write_errors: AtomicU64,
    /// Disk size samples taken
    size_samples: AtomicU64,
    /// Total time spent rotating in nanoseconds
    rotation_duration_ns: AtomicU64,
    /// Creation time
    start_time: Instant,
}

/// Point-in-time copy of [`EngineMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub writes: u64,
    pub bytes_written: u64,
    pub buffered_writes: u64,
    pub rotations: u64,
    pub aborted_rotations: u64,
    pub degraded_rotations: u64,
    pub write_errors: u64,
    pub size_samples: u64,
    pub rotation_duration_ms: u64,
    pub uptime_secs: u64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            writes: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            buffered_writes: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            aborted_rotations: AtomicU64::new(0),
            degraded_rotations: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            size_samples: AtomicU64::new(0),
            rotation_duration_ns: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an appended payload
    pub fn record_write(&self, bytes: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Record a payload queued during rotation
    pub fn increment_buffered(&self) {
        self.buffered_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed rotation
    pub fn record_rotation(&self, duration: Duration) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
        self.rotation_duration_ns.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a rotation abandoned after re-validation
    pub fn increment_aborted(&self) {
        self.aborted_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rotation that ran without the lock
    pub fn increment_degraded(&self) {
        self.degraded_rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed append, flush or reopen
    pub fn increment_write_errors(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disk size sample
    pub fn increment_samples(&self) {
        self.size_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            buffered_writes: self.buffered_writes.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            aborted_rotations: self.aborted_rotations.load(Ordering::Relaxed),
            degraded_rotations: self.degraded_rotations.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            size_samples: self.size_samples.load(Ordering::Relaxed),
            rotation_duration_ms: self.rotation_duration_ns.load(Ordering::Relaxed) / 1_000_000,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}
