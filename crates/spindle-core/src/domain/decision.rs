//! Decision model: what happens to a task after a failed attempt.
//!
//! The Decider is the only component that chooses between
//! Failed -> Pending and Failed -> DeadLetter.

use std::time::Duration;

use super::errors::FailureKind;
use super::retry::RetryPolicy;

/// The next action for a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Requeue after `delay`; the task ends up with `retry_count`.
    Retry {
        delay: Duration,
        retry_count: u32,
        reason: String,
    },

    /// Give up; the task is dead-lettered with `retry_count`.
    DeadLetter { retry_count: u32, reason: String },
}

impl Decision {
    pub fn is_retry(&self) -> bool {
        matches!(self, Decision::Retry { .. })
    }
}

/// Pure function of `(retry_count, max_retries, failure)`. No side effects;
/// the caller carries the decision out against the store.
pub trait Decider: Send + Sync {
    fn decide(&self, retry_count: u32, max_retries: u32, failure: FailureKind) -> Decision;
}

/// Retry-count based decider with exponential backoff.
///
/// - Non-retryable failures dead-letter at once, `retry_count` unchanged.
/// - A retryable failure consumes one retry. While the new count stays
///   below `max_retries` the task is requeued; otherwise it is
///   dead-lettered.
#[derive(Debug, Clone, Default)]
pub struct DefaultDecider {
    retry_policy: RetryPolicy,
}

impl DefaultDecider {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Decider for DefaultDecider {
    fn decide(&self, retry_count: u32, max_retries: u32, failure: FailureKind) -> Decision {
        if failure == FailureKind::NonRetryable {
            return Decision::DeadLetter {
                retry_count,
                reason: "non-retryable failure".to_string(),
            };
        }

        let next = retry_count.saturating_add(1);
        if next < max_retries {
            let delay = self.retry_policy.next_delay(retry_count);
            Decision::Retry {
                delay,
                retry_count: next,
                reason: format!("retry {next}/{max_retries} after {delay:?}"),
            }
        } else {
            Decision::DeadLetter {
                retry_count: next.min(max_retries),
                reason: format!("retries exhausted ({max_retries}/{max_retries})"),
            }
        }
    }
}
