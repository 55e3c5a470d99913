//! Task record: inputs, lifecycle fields and the mutations that move it.
//!
//! `Task` is the single source of truth for a task's state. The store hands
//! out clones; the only way to change a stored task is `Task::apply`, called
//! by the store under its version check.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{FailureKind, LifecycleError};
use super::ids::TaskId;
use super::state::{TaskStatus, validate_transition};

/// Text submitted for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub text: String,
}

impl TaskPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Analysis options, immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// How many of the most frequent words to return.
    pub top_n: usize,

    pub case_sensitive: bool,

    pub exclude_stop_words: bool,

    /// Shorter tokens are ignored.
    pub min_word_length: usize,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            case_sensitive: false,
            exclude_stop_words: true,
            min_word_length: 1,
        }
    }
}

/// Worker identity, chosen by the process that runs the worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who requested a transition (recorded in the audit log).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Client,
    Worker(WorkerId),
    Scanner(String),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Client => f.write_str("client"),
            Actor::Worker(id) => write!(f, "worker:{id}"),
            Actor::Scanner(id) => write!(f, "scanner:{id}"),
        }
    }
}

/// A requested change to a task. Each variant has exactly one target status.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMutation {
    /// Pending -> Processing. Grants the lease to `owner`.
    Start { owner: WorkerId, lease: Duration },

    /// Processing -> Completed.
    Complete { result: serde_json::Value },

    /// Processing -> Failed. `kind` is kept on the task until it is settled.
    Fail { error: String, kind: FailureKind },

    /// Failed -> Pending, consuming one retry.
    Requeue,

    /// Failed -> DeadLetter. `retry_count` is the final count (never lowers
    /// the stored value).
    DeadLetter { error: String, retry_count: u32 },

    /// Pending -> Cancelled.
    Cancel,
}

impl TaskMutation {
    pub fn target_status(&self) -> TaskStatus {
        match self {
            TaskMutation::Start { .. } => TaskStatus::Processing,
            TaskMutation::Complete { .. } => TaskStatus::Completed,
            TaskMutation::Fail { .. } => TaskStatus::Failed,
            TaskMutation::Requeue => TaskStatus::Pending,
            TaskMutation::DeadLetter { .. } => TaskStatus::DeadLetter,
            TaskMutation::Cancel => TaskStatus::Cancelled,
        }
    }
}

/// Stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,

    pub payload: TaskPayload,
    pub options: TaskOptions,

    pub result: Option<serde_json::Value>,
    pub error: Option<String>,

    /// Classification of the failure a FAILED task is waiting to be settled
    /// for. Cleared on requeue.
    #[serde(default)]
    pub failure_kind: Option<FailureKind>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    pub retry_count: u32,
    pub max_retries: u32,

    /// Incremented on every accepted write.
    pub version: u64,

    pub lease_owner: Option<WorkerId>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl Task {
    pub const INITIAL_VERSION: u64 = 1;

    pub fn new(
        id: TaskId,
        payload: TaskPayload,
        options: TaskOptions,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            payload,
            options,
            result: None,
            error: None,
            failure_kind: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            retry_count: 0,
            max_retries,
            version: Self::INITIAL_VERSION,
            lease_owner: None,
            lease_expires_at: None,
        }
    }

    /// Has the lease run out at `now`? False for tasks without a lease.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|expires| now > expires)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Apply `mutation` at `now`.
    ///
    /// Validates the edge, updates fields and bumps `version`. On error the
    /// task is left untouched. Version checking is the store's job.
    pub fn apply(
        &mut self,
        mutation: TaskMutation,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let to = mutation.target_status();
        validate_transition(self.status, to)
            .map_err(|illegal| LifecycleError::invalid_transition(self.id, illegal))?;

        match mutation {
            TaskMutation::Start { owner, lease } => {
                let lease = chrono::Duration::from_std(lease)
                    .map_err(|e| LifecycleError::Validation(format!("lease duration: {e}")))?;
                self.started_at.get_or_insert(now);
                self.lease_owner = Some(owner);
                self.lease_expires_at = Some(now + lease);
            }
            TaskMutation::Complete { result } => {
                self.result = Some(result);
                self.completed_at = Some(now);
                self.clear_lease();
            }
            TaskMutation::Fail { error, kind } => {
                self.error = Some(error);
                self.failure_kind = Some(kind);
                self.clear_lease();
            }
            TaskMutation::Requeue => {
                if self.retries_exhausted() {
                    return Err(LifecycleError::RetriesExhausted {
                        task_id: self.id,
                        retry_count: self.retry_count,
                        max_retries: self.max_retries,
                    });
                }
                self.retry_count += 1;
                self.failure_kind = None;
            }
            TaskMutation::DeadLetter { error, retry_count } => {
                self.error = Some(error);
                self.retry_count = self.retry_count.max(retry_count);
                self.completed_at = Some(now);
            }
            TaskMutation::Cancel => {
                self.completed_at = Some(now);
            }
        }

        self.status = to;
        self.version += 1;
        self.updated_at = now;
        Ok(())
    }

    fn clear_lease(&mut self) {
        self.lease_owner = None;
        self.lease_expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn pending(max_retries: u32) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            TaskPayload::new("the quick brown fox"),
            TaskOptions::default(),
            max_retries,
            now(),
        )
    }

    fn start() -> TaskMutation {
        TaskMutation::Start {
            owner: WorkerId::new("w1"),
            lease: Duration::from_secs(300),
        }
    }

    fn fail(error: &str) -> TaskMutation {
        TaskMutation::Fail {
            error: error.into(),
            kind: FailureKind::Retryable,
        }
    }

    #[test]
    fn new_task_is_pending_at_initial_version() {
        let task = pending(3);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.version, Task::INITIAL_VERSION);
        assert!(task.lease_owner.is_none());
    }

    #[test]
    fn start_sets_lease_and_started_at() {
        let mut task = pending(3);
        task.apply(start(), now()).unwrap();

        assert_eq!(task.status, TaskStatus::Processing);
        assert_eq!(task.started_at, Some(now()));
        assert_eq!(task.lease_owner, Some(WorkerId::new("w1")));
        assert_eq!(
            task.lease_expires_at,
            Some(now() + chrono::Duration::seconds(300))
        );
        assert_eq!(task.version, 2);
    }

    #[test]
    fn leaving_processing_clears_the_lease() {
        let mut task = pending(3);
        task.apply(start(), now()).unwrap();
        task.apply(fail("boom"), now()).unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.lease_owner.is_none());
        assert!(task.lease_expires_at.is_none());
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn started_at_is_set_only_once() {
        let mut task = pending(3);
        task.apply(start(), now()).unwrap();
        task.apply(fail("x"), now()).unwrap();
        task.apply(TaskMutation::Requeue, now()).unwrap();

        let later = now() + chrono::Duration::minutes(1);
        task.apply(start(), later).unwrap();
        assert_eq!(task.started_at, Some(now()));
        assert_eq!(task.lease_expires_at, Some(later + chrono::Duration::seconds(300)));
    }

    #[test]
    fn rejected_mutation_leaves_task_untouched() {
        let mut task = pending(3);
        let before = task.clone();

        let err = task
            .apply(TaskMutation::Complete { result: serde_json::json!({}) }, now())
            .unwrap_err();

        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: TaskStatus::Pending,
                to: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(task, before);
    }

    #[test]
    fn failure_kind_is_kept_until_requeue() {
        let mut task = pending(3);
        task.apply(start(), now()).unwrap();
        task.apply(
            TaskMutation::Fail {
                error: "bad input".into(),
                kind: FailureKind::NonRetryable,
            },
            now(),
        )
        .unwrap();
        assert_eq!(task.failure_kind, Some(FailureKind::NonRetryable));

        task.apply(TaskMutation::Requeue, now()).unwrap();
        assert_eq!(task.failure_kind, None);
    }

    #[test]
    fn requeue_is_refused_once_retries_are_spent() {
        let mut task = pending(1);
        task.apply(start(), now()).unwrap();
        task.apply(fail("x"), now()).unwrap();
        task.apply(TaskMutation::Requeue, now()).unwrap();
        assert_eq!(task.retry_count, 1);

        task.apply(start(), now()).unwrap();
        task.apply(fail("x"), now()).unwrap();
        let err = task.apply(TaskMutation::Requeue, now()).unwrap_err();
        assert!(matches!(err, LifecycleError::RetriesExhausted { .. }));
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[test]
    fn dead_letter_never_lowers_retry_count() {
        let mut task = pending(3);
        task.retry_count = 2;
        task.apply(start(), now()).unwrap();
        task.apply(fail("x"), now()).unwrap();
        task.apply(
            TaskMutation::DeadLetter {
                error: "bad input".into(),
                retry_count: 0,
            },
            now(),
        )
        .unwrap();

        assert_eq!(task.retry_count, 2);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn lease_expiry_is_strict() {
        let mut task = pending(3);
        task.apply(start(), now()).unwrap();
        let expires = task.lease_expires_at.unwrap();

        assert!(!task.lease_expired(expires));
        assert!(task.lease_expired(expires + chrono::Duration::milliseconds(1)));
    }

    #[test]
    fn options_fill_missing_fields_with_defaults() {
        let options: TaskOptions = serde_json::from_str(r#"{ "top_n": 3 }"#).unwrap();
        assert_eq!(options.top_n, 3);
        assert!(options.exclude_stop_words);
    }

    #[test]
    fn actor_display() {
        assert_eq!(Actor::Worker(WorkerId::new("w1")).to_string(), "worker:w1");
        assert_eq!(Actor::Scanner("s".into()).to_string(), "scanner:s");
        assert_eq!(Actor::Client.to_string(), "client");
    }
}
