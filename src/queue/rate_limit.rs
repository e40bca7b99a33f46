//! Per-key retry delay strategies.
//!
//! A limiter only decides *when* a failed key becomes eligible again. It is
//! not a global throttle: distinct keys are delivered back-to-back as soon as
//! they are ready.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Strategy deciding how long a failed key waits before redelivery.
pub trait RateLimiter: Send + Sync {
    /// Delay before `key` is retried. Counts as one more failure for `key`.
    fn next_delay(&self, key: &str) -> Duration;

    /// Clear the failure history of `key`.
    fn forget(&self, key: &str);

    /// Consecutive failures recorded for `key`.
    fn failures(&self, key: &str) -> u32;
}

impl<R: RateLimiter + ?Sized> RateLimiter for Box<R> {
    fn next_delay(&self, key: &str) -> Duration {
        (**self).next_delay(key)
    }

    fn forget(&self, key: &str) {
        (**self).forget(key)
    }

    fn failures(&self, key: &str) -> u32 {
        (**self).failures(key)
    }
}

/// Consecutive failure counts by key.
#[derive(Debug, Default)]
struct FailureCounts {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureCounts {
    /// Record a failure, returning the count *before* it was recorded.
    fn bump(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(key.to_string()).or_insert(0);
        let previous = *count;
        *count = count.saturating_add(1);
        previous
    }

    fn get(&self, key: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn clear(&self, key: &str) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Calculate exponential backoff: `min(base * 2^failures, max)`.
pub fn calculate_backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    2u32.checked_pow(failures)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(max, |delay| delay.min(max))
}

/// Exponential backoff with a ceiling, tracked per key.
#[derive(Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: FailureCounts,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: FailureCounts::default(),
        }
    }
}

impl Default for ExponentialBackoff {
    /// 5ms doubling up to 1000s.
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

impl RateLimiter for ExponentialBackoff {
    fn next_delay(&self, key: &str) -> Duration {
        let failures = self.failures.bump(key);
        calculate_backoff(failures, self.base, self.max)
    }

    fn forget(&self, key: &str) {
        self.failures.clear(key);
    }

    fn failures(&self, key: &str) -> u32 {
        self.failures.get(key)
    }
}

/// Delay grows by `step` per consecutive failure, up to `max`.
#[derive(Debug)]
pub struct LinearBackoff {
    step: Duration,
    max: Duration,
    failures: FailureCounts,
}

impl LinearBackoff {
    pub fn new(step: Duration, max: Duration) -> Self {
        Self {
            step,
            max,
            failures: FailureCounts::default(),
        }
    }
}

impl RateLimiter for LinearBackoff {
    fn next_delay(&self, key: &str) -> Duration {
        let failures = self.failures.bump(key);
        self.step
            .checked_mul(failures.saturating_add(1))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, key: &str) {
        self.failures.clear(key);
    }

    fn failures(&self, key: &str) -> u32 {
        self.failures.get(key)
    }
}

/// Same delay for every retry. Failures are still counted.
#[derive(Debug)]
pub struct FixedDelay {
    delay: Duration,
    failures: FailureCounts,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            failures: FailureCounts::default(),
        }
    }
}

impl RateLimiter for FixedDelay {
    fn next_delay(&self, key: &str) -> Duration {
        self.failures.bump(key);
        self.delay
    }

    fn forget(&self, key: &str) {
        self.failures.clear(key);
    }

    fn failures(&self, key: &str) -> u32 {
        self.failures.get(key)
    }
}
