//! TaskStore port - the single source of truth for tasks.
//!
//! The store owns Task and AuditLogEntry persistence. Every mutation is a
//! conditional write: the caller presents the version it read and the store
//! accepts the write only if it still matches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Actor, AuditLogEntry, LifecycleError, Task, TaskId, TaskMutation, TaskStatus};

/// Filter and page for `TaskStore::list`. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub status: Option<TaskStatus>,
    pub page: usize,
    pub limit: usize,
}

impl ListQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPage<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

impl<T> TaskPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> TaskPage<U> {
        TaskPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Number of tasks per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_letter: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Processing => self.processing += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::DeadLetter => self.dead_letter += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending
            + self.processing
            + self.completed
            + self.failed
            + self.dead_letter
            + self.cancelled
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a freshly created task. Fails if the id already exists.
    async fn insert(&self, task: Task) -> Result<Task, LifecycleError>;

    async fn read(&self, task_id: TaskId) -> Result<Task, LifecycleError>;

    /// Apply `mutation` if the stored version equals `expected_version`.
    ///
    /// On success returns the updated task; the audit entry for the
    /// transition is appended atomically with the write.
    ///
    /// # Errors
    /// - `ConcurrentModification` on version mismatch
    /// - `InvalidTransition` / `RetriesExhausted` from `Task::apply`
    /// - `NotFound`
    async fn write_if(
        &self,
        task_id: TaskId,
        expected_version: u64,
        mutation: TaskMutation,
        actor: Actor,
    ) -> Result<Task, LifecycleError>;

    /// Audit entries of a task, in transition order.
    async fn audit_log(&self, task_id: TaskId) -> Result<Vec<AuditLogEntry>, LifecycleError>;

    /// Snapshot of every task currently in `status`.
    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, LifecycleError>;

    /// Newest first.
    async fn list(&self, query: ListQuery) -> Result<TaskPage<Task>, LifecycleError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, LifecycleError>;
}
