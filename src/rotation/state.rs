use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::EngineTuning;
use crate::naming::PeriodKey;
use crate::rotation::destination::LogDestination;

/// Mutable state of one rotating writer
#[derive(Debug)]
pub(crate) struct RotationState {
    /// Open file
    pub destination: LogDestination,
    /// Period the open file belongs to
    pub period_key: PeriodKey,
    /// Best-effort size of the open file, counting only our own writes
    pub bytes_estimate: u64,
    /// A rotation or drain is in flight
    pub rotating: bool,
    /// Payloads received while rotating, in arrival order
    pub pending: VecDeque<Vec<u8>>,
    /// Disk size sampling schedule
    pub sampler: SizeSampler,
    /// No further writes are accepted
    pub closed: bool,
}

impl RotationState {
    pub fn new(destination: LogDestination, period_key: PeriodKey, size: u64, sampler: SizeSampler) -> Self {
        Self {
            destination,
            period_key,
            bytes_estimate: size,
            rotating: false,
            pending: VecDeque::new(),
            sampler,
            closed: false,
        }
    }
}

/// Adaptive schedule for reading the committed file size
///
/// Busy files are sampled more often: the next check is due after half the
/// estimated time-to-full, bounded by the configured floor and ceiling.
#[derive(Debug, Clone)]
pub(crate) struct SizeSampler {
    next_check: Instant,
    interval: Duration,
    last_size: u64,
    last_sample: Instant,
    min_interval: Duration,
    max_interval: Duration,
}

impl SizeSampler {
    pub fn new(tuning: &EngineTuning, size: u64, now: Instant) -> Self {
        let interval = tuning
            .initial_check_interval
            .clamp(tuning.min_check_interval, tuning.max_check_interval);
        Self {
            next_check: now + interval,
            interval,
            last_size: size,
            last_sample: now,
            min_interval: tuning.min_check_interval,
            max_interval: tuning.max_check_interval,
        }
    }

    /// Current delay between samples
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_check
    }

    /// Record a sample; returns `true` when the file has reached `full_at`
    pub fn observe(&mut self, size: u64, now: Instant, full_at: u64) -> bool {
        let elapsed = now.saturating_duration_since(self.last_sample).as_secs_f64();
        let grown = size.saturating_sub(self.last_size);
        self.last_size = size;
        self.last_sample = now;

        if size >= full_at {
            return true;
        }

        let throughput = if elapsed > 0.0 { grown as f64 / elapsed } else { 0.0 };
        self.interval = if throughput > 0.0 {
            let time_to_full = (full_at - size) as f64 / throughput;
            let secs = (time_to_full / 2.0).min(self.max_interval.as_secs_f64());
            Duration::from_secs_f64(secs).max(self.min_interval)
        } else {
            self.max_interval
        };
        self.next_check = now + self.interval;
        false
    }

    /// Push the next check out by the current interval without sampling
    pub fn defer(&mut self, now: Instant) {
        self.next_check = now + self.interval;
    }

    /// Restart the baseline on a new file, keeping the learned interval
    pub fn resync(&mut self, size: u64, now: Instant) {
        self.last_size = size;
        self.last_sample = now;
        self.next_check = now + self.interval;
    }
}
