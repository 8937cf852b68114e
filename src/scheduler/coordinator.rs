use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::EngineTuning;
use crate::error::{Error, Result};
use crate::events::{Event, EventLog};
use crate::lock::WorkerLease;
use crate::naming::Cadence;
use crate::scheduler::task::PeriodicTask;
use crate::worker::{Worker, WorkerKind, WorkerReport};

/// Runs one worker kind under its lease
///
/// A run acquires the lease, heartbeats it from a separate thread while the
/// worker executes on its own thread, then releases it whatever the outcome.
pub struct WorkerCoordinator {
    worker: Arc<dyn Worker>,
    lease: Arc<WorkerLease>,
    heartbeat_interval: Duration,
    events: Arc<EventLog>,
    /// A run is in flight in this process
    busy: AtomicBool,
}

impl WorkerCoordinator {
    pub fn new(
        worker: Arc<dyn Worker>,
        lock_dir: &Path,
        tuning: &EngineTuning,
        clock: SharedClock,
        events: Arc<EventLog>,
    ) -> Self {
        let lease = WorkerLease::new(lock_dir, worker.kind(), tuning.lease_stale_after, clock);
        Self {
            worker,
            lease: Arc::new(lease),
            heartbeat_interval: tuning.heartbeat_interval,
            events,
            busy: AtomicBool::new(false),
        }
    }

    /// Worker kind
    pub fn kind(&self) -> WorkerKind {
        self.worker.kind()
    }

    /// The lease this coordinator competes for
    pub fn lease(&self) -> &WorkerLease {
        &self.lease
    }

    /// Run one cycle if this process wins the lease
    ///
    /// Returns `Ok(None)` when another process (or an earlier run in this
    /// process) is already doing the work.
    pub fn run_once(&self) -> Result<Option<WorkerReport>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            debug!(kind = %self.kind(), "previous run still in progress");
            return Ok(None);
        }

        let result = self.run_leased();
        self.busy.store(false, Ordering::Release);
        result
    }

    /// Run one cycle, logging instead of returning failures
    pub fn tick(&self) {
        if let Err(e) = self.run_once() {
            error!(kind = %self.kind(), error = %e, "worker run failed");
        }
    }

    /// Take over if the current holder stopped heartbeating
    pub fn check_failover(&self) {
        match self.lease.holder_is_stale() {
            Ok(true) => {
                info!(kind = %self.kind(), "stale lease detected, attempting takeover");
                self.tick();
            }
            Ok(false) => {}
            Err(e) => warn!(kind = %self.kind(), error = %e, "failed to inspect lease"),
        }
    }

    fn run_leased(&self) -> Result<Option<WorkerReport>> {
        let kind = self.kind();
        let record = match self.lease.acquire()? {
            Some(record) => record,
            None => {
                debug!(kind = %kind, "lease held elsewhere, skipping run");
                return Ok(None);
            }
        };
        info!(kind = %kind, attempt = record.attempt, "lease acquired, running worker");

        let lost = Arc::new(AtomicBool::new(false));
        let heartbeat = {
            let lease = Arc::clone(&self.lease);
            let lost = Arc::clone(&lost);
            PeriodicTask::every(&format!("{}-heartbeat", kind), self.heartbeat_interval, move || {
                if lost.load(Ordering::Acquire) {
                    return;
                }
                match lease.renew() {
                    Ok(true) => {}
                    Ok(false) => lost.store(true, Ordering::Release),
                    Err(e) => warn!(kind = %lease.kind(), error = %e, "lease heartbeat failed"),
                }
            })
        };

        let result = match heartbeat {
            Ok(heartbeat) => {
                let result = self.execute();
                heartbeat.stop();
                result
            }
            Err(e) => Err(e),
        };

        if lost.load(Ordering::Acquire) {
            warn!(kind = %kind, "lease was lost while the worker ran");
        }
        if let Err(e) = self.lease.release() {
            warn!(kind = %kind, error = %e, "failed to release lease");
        }

        match result {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                self.events.record(&Event::error(kind.to_string(), &e));
                Err(e)
            }
        }
    }

    /// Run the worker on its own thread and collect its report
    fn execute(&self) -> Result<WorkerReport> {
        let kind = self.kind();
        let (tx, rx) = channel::bounded(1);
        let worker = Arc::clone(&self.worker);

        let handle = thread::Builder::new()
            .name(format!("logsink-{}-worker", kind))
            .spawn(move || {
                let _ = tx.send(worker.run());
            })
            .map_err(|e| Error::scheduler(format!("Failed to spawn {} worker: {}", kind, e)))?;

        let result = rx
            .recv()
            .map_err(|_| Error::scheduler(format!("{} worker exited without a report", kind)))
            .and_then(|report| report);

        if handle.join().is_err() {
            error!(kind = %kind, "worker thread panicked");
        }
        result
    }
}

/// Periodic trigger and failover monitor for one coordinator
pub struct WorkerScheduler {
    coordinator: Arc<WorkerCoordinator>,
    ticker: Option<PeriodicTask>,
    failover: Option<PeriodicTask>,
}

impl WorkerScheduler {
    /// Start ticking at every `cadence` boundary
    pub fn start(
        coordinator: Arc<WorkerCoordinator>,
        cadence: Cadence,
        run_on_start: bool,
        failover_interval: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        let kind = coordinator.kind();

        let ticker = {
            let coordinator = Arc::clone(&coordinator);
            let mut first = run_on_start;
            PeriodicTask::spawn(
                &format!("{}-scheduler", kind),
                move || {
                    if std::mem::replace(&mut first, false) {
                        return Duration::ZERO;
                    }
                    let now = clock.now();
                    (cadence.next_boundary(&now) - now).to_std().unwrap_or(Duration::ZERO)
                },
                move || coordinator.tick(),
            )?
        };

        let failover = {
            let coordinator = Arc::clone(&coordinator);
            PeriodicTask::every(&format!("{}-failover", kind), failover_interval, move || {
                coordinator.check_failover()
            })?
        };

        info!(kind = %kind, cadence = %cadence, run_on_start, "worker scheduler started");

        Ok(Self {
            coordinator,
            ticker: Some(ticker),
            failover: Some(failover),
        })
    }

    /// The coordinator this scheduler drives
    pub fn coordinator(&self) -> &Arc<WorkerCoordinator> {
        &self.coordinator
    }

    /// Whether the timers are still armed
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Cancel both timers; an in-flight run finishes on its own
    pub fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
        if let Some(mut failover) = self.failover.take() {
            failover.cancel();
        }
        debug!(kind = %self.coordinator.kind(), "worker scheduler stopped");
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lock::LeaseRecord;
    use crate::worker::RetentionReport;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::Barrier;
    use std::time::Instant;
    use tempfile::tempdir;
    use uuid::Uuid;

    /// Records how many times it ran; optionally waits on a barrier
    struct CountingWorker {
        runs: Mutex<u32>,
        gate: Option<Arc<Barrier>>,
        fail: bool,
    }

    impl CountingWorker {
        fn new() -> Self {
            Self { runs: Mutex::new(0), gate: None, fail: false }
        }
    }

    impl Worker for CountingWorker {
        fn kind(&self) -> WorkerKind {
            WorkerKind::Retention
        }

        fn run(&self) -> Result<WorkerReport> {
            if let Some(gate) = &self.gate {
                gate.wait();
                gate.wait();
            }
            *self.runs.lock() += 1;
            if self.fail {
                return Err(Error::retention("simulated failure"));
            }
            Ok(WorkerReport::Retention(RetentionReport::default()))
        }
    }

    fn tuning() -> EngineTuning {
        EngineTuning {
            heartbeat_interval: Duration::from_millis(20),
            ..EngineTuning::default()
        }
    }

    fn coordinator(dir: &Path, worker: Arc<CountingWorker>, clock: SharedClock) -> WorkerCoordinator {
        let events = Arc::new(EventLog::new(&dir.join(".meta"), true, clock.clone()));
        WorkerCoordinator::new(worker, &dir.join(".locks"), &tuning(), clock, events)
    }

    #[test]
    fn test_run_once_releases_lease() -> Result<()> {
        let temp_dir = tempdir()?;
        let worker = Arc::new(CountingWorker::new());
        let coordinator = coordinator(temp_dir.path(), worker.clone(), crate::clock::system());

        let report = coordinator.run_once()?;
        assert_eq!(report, Some(WorkerReport::Retention(RetentionReport::default())));
        assert_eq!(*worker.runs.lock(), 1);
        assert!(coordinator.lease().read()?.is_none());

        coordinator.run_once()?;
        assert_eq!(*worker.runs.lock(), 2);

        Ok(())
    }

    #[test]
    fn test_only_one_process_runs_at_a_time() -> Result<()> {
        let temp_dir = tempdir()?;
        let gate = Arc::new(Barrier::new(2));
        let busy_worker = Arc::new(CountingWorker {
            gate: Some(gate.clone()),
            ..CountingWorker::new()
        });
        let idle_worker = Arc::new(CountingWorker::new());

        let first = Arc::new(coordinator(temp_dir.path(), busy_worker.clone(), crate::clock::system()));
        let second = coordinator(temp_dir.path(), idle_worker.clone(), crate::clock::system());

        let running = {
            let first = Arc::clone(&first);
            thread::spawn(move || first.run_once())
        };

        // The first worker is now inside its run, holding the lease
        gate.wait();
        assert!(second.run_once()?.is_none());
        // Re-entering the same coordinator is refused too
        assert!(first.run_once()?.is_none());
        gate.wait();

        assert!(running.join().unwrap()?.is_some());
        assert_eq!(*busy_worker.runs.lock(), 1);
        assert_eq!(*idle_worker.runs.lock(), 0);

        assert!(second.run_once()?.is_some());
        assert_eq!(*idle_worker.runs.lock(), 1);

        Ok(())
    }

    #[test]
    fn test_failed_run_still_releases_lease() -> Result<()> {
        let temp_dir = tempdir()?;
        let worker = Arc::new(CountingWorker { fail: true, ..CountingWorker::new() });
        let coordinator = coordinator(temp_dir.path(), worker, crate::clock::system());

        let err = coordinator.run_once().unwrap_err();
        assert!(matches!(err, Error::Retention(_)));
        assert!(coordinator.lease().read()?.is_none());

        let errors = std::fs::read_dir(temp_dir.path().join(".meta"))?.count();
        assert_eq!(errors, 1);

        Ok(())
    }

    #[test]
    fn test_failover_takes_over_stale_lease() -> Result<()> {
        let temp_dir = tempdir()?;
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        let worker = Arc::new(CountingWorker::new());
        let coordinator = coordinator(temp_dir.path(), worker.clone(), Arc::new(clock.clone()));

        // A crashed process left its lease behind
        let abandoned = LeaseRecord {
            owner_pid: 1,
            owner_id: Uuid::new_v4(),
            started_at: Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap(),
            last_heartbeat: Utc.with_ymd_and_hms(2024, 6, 1, 11, 59, 50).unwrap(),
            attempt: 3,
        };
        std::fs::create_dir_all(temp_dir.path().join(".locks"))?;
        std::fs::write(coordinator.lease().path(), serde_json::to_vec(&abandoned)?)?;

        coordinator.check_failover();
        assert_eq!(*worker.runs.lock(), 0, "lease is still fresh");

        clock.advance(ChronoDuration::seconds(30));
        coordinator.check_failover();
        assert_eq!(*worker.runs.lock(), 1);
        assert!(coordinator.lease().read()?.is_none());

        Ok(())
    }

    #[test]
    fn test_scheduler_runs_on_start_and_stops() -> Result<()> {
        let temp_dir = tempdir()?;
        let worker = Arc::new(CountingWorker::new());
        let coordinator = Arc::new(coordinator(temp_dir.path(), worker.clone(), crate::clock::system()));

        let mut scheduler = WorkerScheduler::start(
            coordinator,
            Cadence::Month,
            true,
            Duration::from_secs(3600),
            crate::clock::system(),
        )?;

        let deadline = Instant::now() + Duration::from_secs(5);
        while *worker.runs.lock() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*worker.runs.lock(), 1);

        scheduler.stop();
        assert!(!scheduler.is_running());

        Ok(())
    }
}
