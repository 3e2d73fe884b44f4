//! Injectable waits for pacing and retries

use std::sync::Mutex;
use std::time::Duration;

/// Blocking wait used between keys, pages and retries.
///
/// Production code uses [`ThreadSleep`]; tests substitute [`NoDelay`] or
/// [`RecordingDelay`] so a batch runs with no wall-clock delay.
pub trait Delay {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn sleep(&self, _duration: Duration) {}
}

/// Records requested waits without sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}
