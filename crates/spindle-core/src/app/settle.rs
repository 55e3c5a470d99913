//! Carrying out a retry decision for a FAILED task.
//!
//! Shared by workers (after a processing failure) and the orphan scanner
//! (after reclaiming a lease). The `Decider` picks the edge; this module
//! performs the conditional write, then re-enqueues or dead-letters.

use std::time::Duration;

use tracing::{info, warn};

use super::context::EngineContext;
use crate::domain::{
    Actor, Decision, DomainEvent, FailureKind, LifecycleError, Task, TaskMutation, TaskStatus,
};

/// What happened to a settled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Requeued { retry_count: u32, delay: Duration },
    DeadLettered { retry_count: u32 },
}

/// Move `failed` out of FAILED according to the retry decision.
///
/// `failed` must be the task as last read (its version is the write
/// condition). A conflict means someone else settled it first. A task with
/// no retries left is dead-lettered even if the decider asks for a retry.
pub async fn settle_failure(
    ctx: &EngineContext,
    failed: &Task,
    failure: FailureKind,
    actor: Actor,
) -> Result<Settlement, LifecycleError> {
    if failed.status != TaskStatus::Failed {
        return Err(LifecycleError::InvalidTransition {
            task_id: failed.id,
            from: failed.status,
            to: TaskStatus::Pending,
        });
    }

    let decision = ctx
        .decider
        .decide(failed.retry_count, failed.max_retries, failure);
    // the retry ceiling holds whatever the decider says
    let decision = if decision.is_retry() && failed.retries_exhausted() {
        Decision::DeadLetter {
            retry_count: failed.retry_count,
            reason: format!(
                "retries exhausted ({}/{})",
                failed.retry_count, failed.max_retries
            ),
        }
    } else {
        decision
    };

    match decision {
        Decision::Retry { delay, reason, .. } => {
            let requeued = ctx
                .store
                .write_if(failed.id, failed.version, TaskMutation::Requeue, actor.clone())
                .await?;

            ctx.channel.enqueue(failed.id, Some(delay)).await?;
            info!(
                task_id = %failed.id,
                retry_count = requeued.retry_count,
                delay_ms = delay.as_millis() as u64,
                %reason,
                "retry scheduled"
            );
            ctx.emit(DomainEvent::RetryScheduled {
                task_id: failed.id,
                retry_count: requeued.retry_count,
                delay,
                by: actor,
            });
            Ok(Settlement::Requeued {
                retry_count: requeued.retry_count,
                delay,
            })
        }
        Decision::DeadLetter {
            retry_count,
            reason,
        } => {
            let error = match &failed.error {
                Some(last) => format!("{last} ({reason})"),
                None => reason.clone(),
            };
            let dead = ctx
                .store
                .write_if(
                    failed.id,
                    failed.version,
                    TaskMutation::DeadLetter { error, retry_count },
                    actor.clone(),
                )
                .await?;

            ctx.channel.dead_letter(failed.id, &reason).await?;
            warn!(
                task_id = %failed.id,
                retry_count = dead.retry_count,
                %reason,
                "task dead-lettered"
            );
            ctx.emit(DomainEvent::TaskDeadLettered {
                task_id: failed.id,
                retry_count: dead.retry_count,
                reason,
                by: actor,
            });
            Ok(Settlement::DeadLettered {
                retry_count: dead.retry_count,
            })
        }
    }
}
