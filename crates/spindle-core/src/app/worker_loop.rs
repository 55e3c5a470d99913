//! WorkerLoop - executes tasks handed out by the work channel.
//!
//! # Flow (`run_once`)
//! 1. `WorkChannel::dequeue` leases a task id
//! 2. read the task; not found or no longer PENDING means a duplicate
//!    delivery, acked and skipped
//! 3. conditional PENDING -> PROCESSING (lease owner, expiry, `started_at`)
//! 4. heartbeat with the current task id
//! 5. `TextProcessor::process`
//! 6. conditional PROCESSING -> COMPLETED, or PROCESSING -> FAILED followed by
//!    the retry decision
//! 7. ack the delivery
//!
//! A conditional write that fails once the attempt is under way means the
//! scanner (or another worker) took the task: the worker abandons it and
//! never retries the write.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::context::EngineContext;
use super::registry::WorkerRegistry;
use super::settle::{Settlement, settle_failure};
use crate::domain::{
    Actor, DomainEvent, LeaseToken, LifecycleError, ProcessingError, TaskId, TaskMutation,
    TaskStatus, WorkerId,
};
use crate::ports::Delivery;

/// Result of one `run_once` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was delivered within the dequeue wait.
    Idle,

    /// Duplicate or stale delivery; acked without doing work.
    Skipped { task_id: TaskId },

    Completed { task_id: TaskId },

    /// Processing failed and the failure was settled.
    Failed {
        task_id: TaskId,
        settlement: Settlement,
    },

    /// Lost a conditional write mid-attempt.
    Abandoned { task_id: TaskId },
}

pub struct WorkerLoop {
    worker_id: WorkerId,
    ctx: EngineContext,
    registry: WorkerRegistry,
    current_task: watch::Sender<Option<TaskId>>,
}

impl WorkerLoop {
    pub fn new(worker_id: WorkerId, ctx: EngineContext, registry: WorkerRegistry) -> Self {
        let (current_task, _) = watch::channel(None);
        Self {
            worker_id,
            ctx,
            registry,
            current_task,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Task currently held by this worker, for the heartbeat loop.
    pub fn current_task(&self) -> watch::Receiver<Option<TaskId>> {
        self.current_task.subscribe()
    }

    fn actor(&self) -> Actor {
        Actor::Worker(self.worker_id.clone())
    }

    pub async fn run_once(&self) -> Result<RunOutcome, LifecycleError> {
        let config = &self.ctx.config;
        let Some(delivery) = self
            .ctx
            .channel
            .dequeue(config.lease_duration(), config.dequeue_wait())
            .await?
        else {
            return Ok(RunOutcome::Idle);
        };

        let outcome = self.attempt(&delivery).await;

        match &outcome {
            // infrastructure trouble before the task was started
            Err(e) if !e.is_conflict() => {
                warn!(
                    worker_id = %self.worker_id,
                    task_id = %delivery.task_id,
                    error = %e,
                    "attempt failed before start, returning delivery"
                );
                self.release(delivery.lease_token, Release::Nack).await;
            }
            _ => self.release(delivery.lease_token, Release::Ack).await,
        }
        outcome
    }

    async fn attempt(&self, delivery: &Delivery) -> Result<RunOutcome, LifecycleError> {
        let task_id = delivery.task_id;
        let config = &self.ctx.config;

        let task = match self.ctx.store.read(task_id).await {
            Ok(task) => task,
            Err(LifecycleError::NotFound(_)) => {
                warn!(task_id = %task_id, "delivered task does not exist, dropping");
                return Ok(RunOutcome::Skipped { task_id });
            }
            Err(e) => return Err(e),
        };

        if task.status != TaskStatus::Pending {
            debug!(
                task_id = %task_id,
                status = %task.status,
                delivery_count = delivery.delivery_count,
                "duplicate delivery, skipping"
            );
            return Ok(RunOutcome::Skipped { task_id });
        }

        let start = TaskMutation::Start {
            owner: self.worker_id.clone(),
            lease: config.lease_duration(),
        };
        let started = match self
            .ctx
            .store
            .write_if(task_id, task.version, start, self.actor())
            .await
        {
            Ok(started) => started,
            Err(e) if e.is_conflict() => {
                debug!(task_id = %task_id, error = %e, "lost the race to start, skipping");
                return Ok(RunOutcome::Skipped { task_id });
            }
            Err(e) => return Err(e),
        };

        info!(
            worker_id = %self.worker_id,
            task_id = %task_id,
            version = started.version,
            "task started"
        );
        self.ctx.emit(DomainEvent::TaskStarted {
            task_id,
            worker_id: self.worker_id.clone(),
        });

        self.current_task.send_replace(Some(task_id));
        if let Err(e) = self.registry.beat(&self.worker_id, Some(task_id)).await {
            warn!(worker_id = %self.worker_id, error = %e, "heartbeat failed");
        }

        let processed = self
            .ctx
            .processor
            .process(&started.payload, &started.options)
            .await;

        let finished = match processed {
            Ok(result) => self.complete(task_id, started.version, result).await,
            Err(failure) => {
                warn!(
                    worker_id = %self.worker_id,
                    task_id = %task_id,
                    error = %failure,
                    "processing failed"
                );
                self.fail(task_id, started.version, failure).await
            }
        };

        self.current_task.send_replace(None);
        if let Err(e) = self.registry.beat(&self.worker_id, None).await {
            warn!(worker_id = %self.worker_id, error = %e, "heartbeat failed");
        }

        match finished {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_conflict() => {
                warn!(
                    worker_id = %self.worker_id,
                    task_id = %task_id,
                    error = %e,
                    "task was taken over mid-attempt, abandoning"
                );
                self.ctx.emit(DomainEvent::LeaseLost {
                    task_id,
                    worker_id: self.worker_id.clone(),
                });
                Ok(RunOutcome::Abandoned { task_id })
            }
            Err(e) => {
                // started but not finished: the scanner recovers it once the lease runs out
                error!(
                    worker_id = %self.worker_id,
                    task_id = %task_id,
                    error = %e,
                    "could not record attempt result"
                );
                Ok(RunOutcome::Abandoned { task_id })
            }
        }
    }

    async fn complete(
        &self,
        task_id: TaskId,
        version: u64,
        result: serde_json::Value,
    ) -> Result<RunOutcome, LifecycleError> {
        let completed = self
            .ctx
            .store
            .write_if(task_id, version, TaskMutation::Complete { result }, self.actor())
            .await?;

        info!(
            worker_id = %self.worker_id,
            task_id = %task_id,
            version = completed.version,
            "task completed"
        );
        self.ctx.emit(DomainEvent::TaskCompleted {
            task_id,
            worker_id: self.worker_id.clone(),
        });
        Ok(RunOutcome::Completed { task_id })
    }

    async fn fail(
        &self,
        task_id: TaskId,
        version: u64,
        failure: ProcessingError,
    ) -> Result<RunOutcome, LifecycleError> {
        let failed = self
            .ctx
            .store
            .write_if(
                task_id,
                version,
                TaskMutation::Fail {
                    error: failure.message().to_string(),
                    kind: failure.kind(),
                },
                self.actor(),
            )
            .await?;

        let settlement = settle_failure(&self.ctx, &failed, failure.kind(), self.actor()).await?;
        Ok(RunOutcome::Failed {
            task_id,
            settlement,
        })
    }

    async fn release(&self, token: LeaseToken, release: Release) {
        let result = match release {
            Release::Ack => self.ctx.channel.ack(token).await,
            Release::Nack => self.ctx.channel.nack(token).await,
        };
        if let Err(e) = result {
            // lease ran out while the task was processing; the redelivery is
            // skipped because the task is no longer PENDING
            warn!(
                worker_id = %self.worker_id,
                lease = %token,
                error = %e,
                "could not release delivery"
            );
        }
    }

    /// Call `run_once` until `shutdown` flips to true. An in-flight attempt
    /// always runs to completion.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "worker started");
        if let Err(e) = self.registry.register(&self.worker_id).await {
            warn!(worker_id = %self.worker_id, error = %e, "registration failed");
        }

        while !*shutdown.borrow() {
            match self.run_once().await {
                Ok(RunOutcome::Idle) => {}
                Ok(outcome) => debug!(worker_id = %self.worker_id, ?outcome, "attempt finished"),
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "worker iteration failed");
                    tokio::time::sleep(self.ctx.config.dequeue_wait()).await;
                }
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }
}

#[derive(Debug, Clone, Copy)]
enum Release {
    Ack,
    Nack,
}
