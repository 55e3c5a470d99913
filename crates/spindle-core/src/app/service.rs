//! TaskService - the operations exposed to the request layer.

use tracing::{debug, info};

use super::context::EngineContext;
use super::status::{Stats, TaskView};
use crate::domain::{
    Actor, AuditLogEntry, DomainEvent, LifecycleError, Task, TaskId, TaskMutation, TaskOptions,
    TaskPayload, TaskStatus,
};
use crate::ports::{DeadLetter, ListQuery, TaskPage};

#[derive(Clone)]
pub struct TaskService {
    ctx: EngineContext,
}

impl TaskService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Validate, create a PENDING task and hand it to the work channel.
    /// Every call creates a new task.
    pub async fn submit(
        &self,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<TaskId, LifecycleError> {
        self.validate(&payload, &options)?;

        let task = Task::new(
            self.ctx.ids.generate_task_id(),
            payload,
            options,
            self.ctx.config.retry.max_retries,
            self.ctx.clock.now(),
        );
        let task = self.ctx.store.insert(task).await?;
        self.ctx.channel.enqueue(task.id, None).await?;

        info!(task_id = %task.id, bytes = task.payload.text.len(), "task submitted");
        self.ctx.emit(DomainEvent::TaskSubmitted { task_id: task.id });
        Ok(task.id)
    }

    fn validate(&self, payload: &TaskPayload, options: &TaskOptions) -> Result<(), LifecycleError> {
        let limits = &self.ctx.config.submission;
        if payload.text.trim().is_empty() {
            return Err(LifecycleError::Validation("text must not be empty".into()));
        }
        if payload.text.len() > limits.max_payload_bytes {
            return Err(LifecycleError::Validation(format!(
                "text is {} bytes, limit is {}",
                payload.text.len(),
                limits.max_payload_bytes
            )));
        }
        if options.top_n == 0 || options.top_n > limits.max_top_n {
            return Err(LifecycleError::Validation(format!(
                "top_n must be within 1..={}",
                limits.max_top_n
            )));
        }
        if options.min_word_length == 0 || options.min_word_length > limits.max_min_word_length {
            return Err(LifecycleError::Validation(format!(
                "min_word_length must be within 1..={}",
                limits.max_min_word_length
            )));
        }
        Ok(())
    }

    pub async fn get_status(&self, task_id: TaskId) -> Result<TaskView, LifecycleError> {
        Ok(TaskView::from(self.ctx.store.read(task_id).await?))
    }

    /// Newest first. `page` is 1-based.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        page: usize,
        limit: usize,
    ) -> Result<TaskPage<TaskView>, LifecycleError> {
        let max = self.ctx.config.submission.max_page_size;
        if page == 0 {
            return Err(LifecycleError::Validation("page starts at 1".into()));
        }
        if limit == 0 || limit > max {
            return Err(LifecycleError::Validation(format!(
                "limit must be within 1..={max}"
            )));
        }

        let page = self
            .ctx
            .store
            .list(ListQuery {
                status,
                page,
                limit,
            })
            .await?;
        Ok(page.map(TaskView::from))
    }

    /// Cancel a task that no worker has picked up yet.
    ///
    /// Version conflicts are retried on a fresh read; once the task has left
    /// PENDING the result is `InvalidTransition`.
    pub async fn cancel(&self, task_id: TaskId) -> Result<TaskView, LifecycleError> {
        let attempts = self.ctx.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            let task = self.ctx.store.read(task_id).await?;
            match self
                .ctx
                .store
                .write_if(task_id, task.version, TaskMutation::Cancel, Actor::Client)
                .await
            {
                Ok(cancelled) => {
                    info!(task_id = %task_id, "task cancelled");
                    self.ctx.emit(DomainEvent::TaskCancelled { task_id });
                    return Ok(TaskView::from(cancelled));
                }
                Err(LifecycleError::ConcurrentModification { .. }) => {
                    debug!(task_id = %task_id, attempt, "cancel raced another write, reloading");
                }
                Err(e) => return Err(e),
            }
        }
        Err(LifecycleError::Store(format!(
            "cancel of {task_id} kept conflicting after {attempts} attempts"
        )))
    }

    pub async fn audit_trail(&self, task_id: TaskId) -> Result<Vec<AuditLogEntry>, LifecycleError> {
        self.ctx.store.audit_log(task_id).await
    }

    pub async fn stats(&self) -> Result<Stats, LifecycleError> {
        Ok(Stats {
            tasks: self.ctx.store.counts_by_status().await?,
            channel: self.ctx.channel.depth().await?,
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>, LifecycleError> {
        Ok(self.ctx.channel.dead_letters().await?)
    }
}
