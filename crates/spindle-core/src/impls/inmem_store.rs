//! InMemoryTaskStore - development / test implementation of `TaskStore`.
//!
//! One `RwLock` guards tasks, audit streams and insertion order together, so
//! a version check, the mutation and its audit entry are a single critical
//! section. No `.await` happens while the lock is held apart from acquiring
//! it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{Actor, AuditLogEntry, LifecycleError, Task, TaskId, TaskMutation, TaskStatus};
use crate::ports::{Clock, ListQuery, StatusCounts, TaskPage, TaskStore};

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, Task>,
    audit: HashMap<TaskId, Vec<AuditLogEntry>>,

    /// Insertion order; `list` walks it backwards for newest-first.
    order: Vec<TaskId>,
}

pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
        }
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<Task, LifecycleError> {
        let mut state = self.state.write().await;
        if state.tasks.contains_key(&task.id) {
            return Err(LifecycleError::Store(format!("duplicate task id {}", task.id)));
        }
        state.order.push(task.id);
        state.audit.insert(task.id, Vec::new());
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn read(&self, task_id: TaskId) -> Result<Task, LifecycleError> {
        let state = self.state.read().await;
        state
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or(LifecycleError::NotFound(task_id))
    }

    async fn write_if(
        &self,
        task_id: TaskId,
        expected_version: u64,
        mutation: TaskMutation,
        actor: Actor,
    ) -> Result<Task, LifecycleError> {
        let now = self.clock.now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stored = state
            .tasks
            .get_mut(&task_id)
            .ok_or(LifecycleError::NotFound(task_id))?;

        if stored.version != expected_version {
            return Err(LifecycleError::ConcurrentModification {
                task_id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        // apply on a copy so a rejected mutation leaves no trace
        let mut next = stored.clone();
        let old_status = next.status;
        next.apply(mutation, now)?;
        *stored = next.clone();

        state.audit.entry(task_id).or_default().push(AuditLogEntry {
            task_id,
            old_status,
            new_status: next.status,
            changed_at: now,
            changed_by: actor.clone(),
            version: next.version,
        });

        debug!(
            task_id = %task_id,
            from = %old_status,
            to = %next.status,
            version = next.version,
            actor = %actor,
            "task transition"
        );
        Ok(next)
    }

    async fn audit_log(&self, task_id: TaskId) -> Result<Vec<AuditLogEntry>, LifecycleError> {
        let state = self.state.read().await;
        state
            .audit
            .get(&task_id)
            .cloned()
            .ok_or(LifecycleError::NotFound(task_id))
    }

    async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, LifecycleError> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|task| task.status == status)
            .cloned()
            .collect())
    }

    async fn list(&self, query: ListQuery) -> Result<TaskPage<Task>, LifecycleError> {
        let state = self.state.read().await;
        let matching: Vec<&Task> = state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.tasks.get(id))
            .filter(|task| query.status.is_none_or(|status| task.status == status))
            .collect();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(query.offset())
            .take(query.limit)
            .cloned()
            .collect();

        Ok(TaskPage {
            items,
            total,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, LifecycleError> {
        let state = self.state.read().await;
        let mut counts = StatusCounts::default();
        for task in state.tasks.values() {
            counts.record(task.status);
        }
        Ok(counts)
    }
}
