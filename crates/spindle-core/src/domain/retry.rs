//! Retry policy: decides backoff delays.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `base_delay * multiplier^retry_count`, capped at
/// `max_delay`.
///
/// Example with base_delay=1s, multiplier=2.0:
/// - first failure (retry_count 0): 1s
/// - second failure: 2s
/// - third failure: 4s
///
/// `jitter` adds up to that fraction of the delay at random. Zero keeps the
/// schedule deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before re-enqueueing a task that has already been retried
    /// `retry_count` times.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let delay = Duration::from_secs_f64(capped.max(0.0));

        if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            delay.mul_f64(1.0 + extra)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0)
    }
}
