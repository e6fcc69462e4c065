// src/fetch/backoff.rs

use std::sync::Arc;
use std::time::Duration;

use crate::config::BackoffPolicy;

/// Blocking wait. Abstracted so retry and pacing schedules can be observed
/// without real time passing.
pub trait Sleep {
    fn sleep(&self, dur: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

impl<T: Sleep + ?Sized> Sleep for &T {
    fn sleep(&self, dur: Duration) {
        (**self).sleep(dur)
    }
}

impl<T: Sleep + ?Sized> Sleep for Arc<T> {
    fn sleep(&self, dur: Duration) {
        (**self).sleep(dur)
    }
}

/// Per-lookup retry delay. Starts at `policy.base` and grows by `policy.step`
/// after every wait, never beyond `policy.max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.base,
        }
    }

    /// Delay to wait now; advances the schedule for the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current + self.policy.step).min(self.policy.max);
        delay
    }
}
