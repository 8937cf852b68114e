use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::{EngineTuning, ResolvedConfig};
use crate::error::Result;
use crate::events::{Event, EventLog};
use crate::lock::RotationLock;
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::naming::{Cadence, PeriodKey};
use crate::rotation::destination::LogDestination;
use crate::rotation::select::{select_next_file, Capacity};
use crate::rotation::state::{RotationState, SizeSampler};
use crate::rotation::RotationReason;

/// Per-process writer that rotates by period and by size
///
/// `write` never blocks on a rotation: while one is in flight, payloads are
/// queued and replayed in order on the new file.
pub struct RotatingWriter {
    inner: Arc<Inner>,
}

struct Inner {
    directory: PathBuf,
    cadence: Cadence,
    capacity: Capacity,
    tuning: EngineTuning,
    lock: RotationLock,
    clock: SharedClock,
    events: Arc<EventLog>,
    metrics: EngineMetrics,
    state: Mutex<RotationState>,
    /// Signalled when a rotation drain finishes
    idle: Condvar,
}

/// Outcome of one rotation attempt
enum Rotated {
    Switched,
    Aborted,
}

impl RotatingWriter {
    /// Open the writer on the file for the current period
    pub fn open(config: &ResolvedConfig, clock: SharedClock, events: Arc<EventLog>) -> Result<Self> {
        fs::create_dir_all(&config.directory)?;

        let capacity = Capacity::new(config.rotation.max_size, config.tuning.overflow_threshold);
        let cadence = config.rotation.cadence;
        let now = clock.now();
        let period_key = cadence.period_key(&now);

        let path = select_next_file(&config.directory, &period_key, cadence, &now, capacity, 0, None)?;
        let destination = LogDestination::open(&path)?;
        let size = destination.committed_len()?;
        let sampler = SizeSampler::new(&config.tuning, size, Instant::now());

        info!(path = %path.display(), size, "log destination opened");

        Ok(Self {
            inner: Arc::new(Inner {
                directory: config.directory.clone(),
                cadence,
                capacity,
                tuning: config.tuning.clone(),
                lock: RotationLock::new(&config.lock_directory(), &config.tuning),
                clock,
                events,
                metrics: EngineMetrics::new(),
                state: Mutex::new(RotationState::new(destination, period_key, size, sampler)),
                idle: Condvar::new(),
            }),
        })
    }

    /// Accept one payload
    ///
    /// Returns `false` only when the writer is closed or the append failed;
    /// I/O failures are logged, never raised.
    pub fn write(&self, payload: &[u8]) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        if state.closed {
            return false;
        }

        if state.rotating {
            state.pending.push_back(payload.to_vec());
            inner.metrics.increment_buffered();
            return true;
        }

        match inner.check_triggers(&mut state, payload.len() as u64) {
            Some(reason) => {
                state.rotating = true;
                state.pending.push_back(payload.to_vec());
                inner.metrics.increment_buffered();
                drop(state);
                self.spawn_rotation(reason);
                true
            }
            None => inner.append(&mut state, payload),
        }
    }

    fn spawn_rotation(&self, reason: RotationReason) {
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("logsink-rotation".to_string())
            .spawn(move || inner.rotate_and_drain(reason));

        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn rotation thread, rotating inline");
            self.inner.rotate_and_drain(reason);
        }
    }

    /// Wait for any in-flight rotation, then flush to disk
    pub fn flush(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while state.rotating {
            self.inner.idle.wait(&mut state);
        }
        state.destination.flush()
    }

    /// Flush and refuse further writes
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        while state.rotating {
            self.inner.idle.wait(&mut state);
        }
        state.closed = true;
        state.destination.flush()
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.inner.state.lock().destination.path().to_path_buf()
    }

    /// Period the current file belongs to
    pub fn period_key(&self) -> PeriodKey {
        self.inner.state.lock().period_key.clone()
    }

    /// Whether a rotation or drain is in flight
    pub fn is_rotating(&self) -> bool {
        self.inner.state.lock().rotating
    }

    /// Log directory
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Get current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to flush log destination on drop");
        }
    }
}

impl Inner {
    /// Decide whether `incoming` more bytes require a rotation first
    fn check_triggers(&self, state: &mut RotationState, incoming: u64) -> Option<RotationReason> {
        let key = self.cadence.period_key(&self.clock.now());
        if key != state.period_key {
            return Some(RotationReason::Period);
        }

        if state.bytes_estimate > 0 && state.bytes_estimate.saturating_add(incoming) > self.capacity.max_size {
            return Some(RotationReason::Size);
        }

        let now = Instant::now();
        if state.sampler.is_due(now) {
            self.metrics.increment_samples();
            if let Err(e) = state.destination.flush() {
                self.metrics.increment_write_errors();
                warn!(error = %e, "flush before size sample failed");
            }
            match state.destination.committed_len() {
                Ok(size) => {
                    if state.sampler.observe(size, now, self.capacity.full_at) {
                        return Some(RotationReason::Size);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "size sample failed");
                    state.sampler.defer(now);
                }
            }
        }

        None
    }

    fn append(&self, state: &mut RotationState, payload: &[u8]) -> bool {
        match state.destination.append(payload) {
            Ok(()) => {
                state.bytes_estimate += payload.len() as u64;
                self.metrics.record_write(payload.len());
                true
            }
            Err(e) => {
                self.metrics.increment_write_errors();
                error!(path = %state.destination.path().display(), error = %e, "log append failed");
                self.events.record(&Event::error("write", &e));
                false
            }
        }
    }

    /// Rotate, then replay queued payloads, rotating again as they fill files
    fn rotate_and_drain(&self, reason: RotationReason) {
        let limit = self.tuning.max_rotations_per_drain.max(1);
        let mut next = Some(reason);
        let mut rotations = 0;

        loop {
            if let Some(reason) = next.take() {
                self.rotate(reason);
                rotations += 1;
            }

            let mut state = self.state.lock();
            let incoming = match state.pending.front() {
                Some(payload) => payload.len() as u64,
                None => {
                    state.rotating = false;
                    self.idle.notify_all();
                    return;
                }
            };

            if rotations < limit {
                if let Some(reason) = self.check_triggers(&mut state, incoming) {
                    next = Some(reason);
                    continue;
                }
            } else if rotations == limit {
                warn!(limit, "rotation limit reached while draining, writing to current file");
                rotations += 1;
            }

            if let Some(payload) = state.pending.pop_front() {
                self.append(&mut state, &payload);
            }
        }
    }

    /// Run one rotation under the rotation lock
    fn rotate(&self, reason: RotationReason) {
        let started = Instant::now();
        let guard = self.lock.acquire();
        let degraded = guard.is_none();
        if degraded {
            self.metrics.increment_degraded();
            warn!(reason = %reason, "rotating without the rotation lock");
        }

        match self.switch_file(reason, degraded) {
            Ok(Rotated::Switched) => self.metrics.record_rotation(started.elapsed()),
            Ok(Rotated::Aborted) => self.metrics.increment_aborted(),
            Err(e) => {
                self.metrics.increment_write_errors();
                error!(reason = %reason, error = %e, "rotation failed, keeping current file");
                self.events.record(&Event::error("rotation", &e));
            }
        }

        if let Some(guard) = guard {
            if let Err(e) = guard.release() {
                warn!(error = %e, "failed to release rotation lock");
            }
        }
    }

    fn switch_file(&self, reason: RotationReason, degraded: bool) -> Result<Rotated> {
        let now = self.clock.now();
        let key = self.cadence.period_key(&now);

        let (from, incoming, committed, same_period) = {
            let mut state = self.state.lock();
            state.destination.flush()?;
            let committed = match state.destination.committed_len() {
                Ok(size) => Some(size),
                // Removed underneath us: a new file is needed regardless
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            let incoming = state.pending.front().map_or(0, |p| p.len() as u64);

            if reason == RotationReason::Size && key == state.period_key {
                if let Some(size) = committed {
                    if self.capacity.has_room(size, incoming) {
                        debug!(size, "file no longer full, resyncing instead of rotating");
                        state.bytes_estimate = size;
                        state.sampler.resync(size, Instant::now());
                        return Ok(Rotated::Aborted);
                    }
                }
            }

            (
                state.destination.path().to_path_buf(),
                incoming,
                committed,
                key == state.period_key,
            )
        };

        let floor = same_period.then_some(from.as_path());
        let next = select_next_file(&self.directory, &key, self.cadence, &now, self.capacity, incoming, floor)?;

        let mut state = self.state.lock();
        state.destination.reopen(&next)?;
        let size = state.destination.committed_len().unwrap_or(0);
        state.period_key = key;
        state.bytes_estimate = size;
        state.sampler.resync(size, Instant::now());
        drop(state);

        info!(
            reason = %reason,
            from = %from.display(),
            to = %next.display(),
            previous_size = ?committed,
            degraded,
            "log file rotated"
        );
        self.events.record(&Event::Rotation {
            reason,
            from,
            to: next,
            degraded,
        });

        Ok(Rotated::Switched)
    }
}
