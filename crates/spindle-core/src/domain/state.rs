//! Task status and the transition graph.
//!
//! Allowed transitions:
//! - Pending -> Processing -> Completed
//! - Pending -> Cancelled
//! - Processing -> Failed -> Pending (retry, loop until retries are spent)
//! - Processing -> Failed -> DeadLetter
//!
//! `validate_transition` is the only place this graph is encoded. Every
//! store mutation goes through it.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for a worker.
    Pending,

    /// Leased and being executed by a worker.
    Processing,

    /// Finished successfully; `result` is set.
    Completed,

    /// The last attempt failed; the retry policy has not run yet.
    Failed,

    /// Gave up (retries spent or non-retryable failure).
    DeadLetter,

    /// Cancelled by a client before any worker picked it up.
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::DeadLetter,
        TaskStatus::Cancelled,
    ];

    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::DeadLetter | TaskStatus::Cancelled
        )
    }

    /// Is `self -> next` an edge of the lifecycle graph?
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
                | (Failed, DeadLetter)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::DeadLetter => "DEAD_LETTER",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown task status: {s}"))
    }
}

/// Rejected edge of the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Central transition check.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), IllegalTransition> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use TaskStatus::*;

    #[rstest]
    #[case::lease(Pending, Processing)]
    #[case::cancel(Pending, Cancelled)]
    #[case::complete(Processing, Completed)]
    #[case::fail(Processing, Failed)]
    #[case::retry(Failed, Pending)]
    #[case::dead_letter(Failed, DeadLetter)]
    fn allowed_edges(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert!(validate_transition(from, to).is_ok());
    }

    #[rstest]
    #[case::cancel_running(Processing, Cancelled)]
    #[case::skip_processing(Pending, Completed)]
    #[case::requeue_running(Processing, Pending)]
    #[case::dead_letter_running(Processing, DeadLetter)]
    #[case::revive_completed(Completed, Pending)]
    #[case::revive_dead(DeadLetter, Pending)]
    #[case::uncancel(Cancelled, Pending)]
    #[case::self_loop(Pending, Pending)]
    fn rejected_edges(#[case] from: TaskStatus, #[case] to: TaskStatus) {
        assert_eq!(
            validate_transition(from, to),
            Err(IllegalTransition { from, to })
        );
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in TaskStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in TaskStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&DeadLetter).unwrap();
        assert_eq!(s, "\"DEAD_LETTER\"");
        assert_eq!("dead_letter".parse::<TaskStatus>(), Ok(DeadLetter));
    }
}
