//! Error taxonomy of the lifecycle engine.
//!
//! - `LifecycleError`: everything a store write or service call can fail with.
//! - `ProcessingError`: what the external processing function reports,
//!   classified by `FailureKind` so the retry policy can route it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::TaskId;
use super::state::{IllegalTransition, TaskStatus};
use crate::ports::ChannelError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Malformed input at submission; the task is never created.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Version mismatch on a conditional write. Callers reload and retry the
    /// higher-level operation; this never reaches a user.
    #[error("concurrent modification of {task_id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        task_id: TaskId,
        expected: u64,
        actual: u64,
    },

    /// A requeue was attempted on a task whose retries are spent.
    #[error("retries exhausted for {task_id}: {retry_count}/{max_retries}")]
    RetriesExhausted {
        task_id: TaskId,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("store failure: {0}")]
    Store(String),
}

impl LifecycleError {
    pub fn invalid_transition(task_id: TaskId, illegal: IllegalTransition) -> Self {
        Self::InvalidTransition {
            task_id,
            from: illegal.from,
            to: illegal.to,
        }
    }

    /// Lost a race on a conditional write (someone else moved the task).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            LifecycleError::ConcurrentModification { .. } | LifecycleError::InvalidTransition { .. }
        )
    }
}

/// Classification of a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transient (resource exhaustion, timeouts upstream, ...). Drives retry.
    Retryable,

    /// Permanent (e.g. invalid payload found during processing). Goes
    /// straight to the dead-letter channel.
    NonRetryable,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Retryable => f.write_str("retryable"),
            FailureKind::NonRetryable => f.write_str("non-retryable"),
        }
    }
}

/// Failure reported by the processing function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} processing failure: {message}")]
pub struct ProcessingError {
    kind: FailureKind,
    message: String,
}

impl ProcessingError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::NonRetryable,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn conflict_detection() {
        let task_id = TaskId::from_ulid(Ulid::new());
        let cm = LifecycleError::ConcurrentModification {
            task_id,
            expected: 1,
            actual: 2,
        };
        assert!(cm.is_conflict());
        assert!(!LifecycleError::NotFound(task_id).is_conflict());
    }

    #[test]
    fn processing_error_display_mentions_kind() {
        let err = ProcessingError::non_retryable("no words");
        assert_eq!(err.kind(), FailureKind::NonRetryable);
        assert_eq!(err.to_string(), "non-retryable processing failure: no words");
    }
}
