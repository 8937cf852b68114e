use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, after, select, Sender};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A cancellable background ticker
///
/// Each round sleeps for `next_delay()` and then calls `tick`. Cancelling
/// wakes the sleeping thread immediately; a tick already running is allowed
/// to finish.
pub struct PeriodicTask {
    name: String,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a ticker thread
    pub fn spawn<D, F>(name: &str, mut next_delay: D, mut tick: F) -> Result<Self>
    where
        D: FnMut() -> Duration + Send + 'static,
        F: FnMut() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let thread_name = format!("logsink-{}", name);

        let handle = thread::Builder::new()
            .name(thread_name)
            .spawn(move || loop {
                let delay = next_delay();
                select! {
                    recv(cancel_rx) -> _ => break,
                    recv(after(delay)) -> _ => tick(),
                }
            })
            .map_err(|e| Error::scheduler(format!("Failed to spawn {} task: {}", name, e)))?;

        debug!(task = name, "periodic task started");

        Ok(Self {
            name: name.to_string(),
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Spawn a ticker with a fixed interval
    pub fn every<F>(name: &str, interval: Duration, tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::spawn(name, move || interval, tick)
    }

    /// Task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task has not been cancelled yet
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Stop scheduling new ticks without waiting
    pub fn cancel(&mut self) {
        // Dropping the sender disconnects the channel, which wakes the select
        self.cancel.take();
    }

    /// Cancel and wait for the thread to exit
    pub fn stop(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(task = %self.name, "periodic task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let task = PeriodicTask::every("test-ticker", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(task.is_running());

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.stop();

        let stopped_at = ticks.load(Ordering::SeqCst);
        assert!(stopped_at >= 3);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn test_cancel_interrupts_long_sleep() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let task = PeriodicTask::every("test-sleeper", Duration::from_secs(3600), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let started = Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delay_is_recomputed_each_round() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut first = true;

        // Zero delay first, then effectively never
        let task = PeriodicTask::spawn(
            "test-on-start",
            move || {
                if std::mem::replace(&mut first, false) {
                    Duration::ZERO
                } else {
                    Duration::from_secs(3600)
                }
            },
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
