//! Domain events emitted by the engine.
//!
//! Events are countable facts for metrics/alerting. Control flow never
//! depends on them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::task::{Actor, WorkerId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    TaskSubmitted {
        task_id: TaskId,
    },
    TaskStarted {
        task_id: TaskId,
        worker_id: WorkerId,
    },
    TaskCompleted {
        task_id: TaskId,
        worker_id: WorkerId,
    },
    RetryScheduled {
        task_id: TaskId,
        retry_count: u32,
        delay: Duration,
        by: Actor,
    },
    TaskDeadLettered {
        task_id: TaskId,
        retry_count: u32,
        reason: String,
        by: Actor,
    },
    TaskCancelled {
        task_id: TaskId,
    },
    /// The scanner took a task back from a worker that stopped making progress.
    OrphanReclaimed {
        task_id: TaskId,
        previous_owner: Option<WorkerId>,
    },
    /// A worker lost a conditional write and abandoned the task.
    LeaseLost {
        task_id: TaskId,
        worker_id: WorkerId,
    },
}

/// Discriminant of `DomainEvent`, used as a counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskSubmitted,
    TaskStarted,
    TaskCompleted,
    RetryScheduled,
    TaskDeadLettered,
    TaskCancelled,
    OrphanReclaimed,
    LeaseLost,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DomainEvent::TaskSubmitted { .. } => EventKind::TaskSubmitted,
            DomainEvent::TaskStarted { .. } => EventKind::TaskStarted,
            DomainEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            DomainEvent::RetryScheduled { .. } => EventKind::RetryScheduled,
            DomainEvent::TaskDeadLettered { .. } => EventKind::TaskDeadLettered,
            DomainEvent::TaskCancelled { .. } => EventKind::TaskCancelled,
            DomainEvent::OrphanReclaimed { .. } => EventKind::OrphanReclaimed,
            DomainEvent::LeaseLost { .. } => EventKind::LeaseLost,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            DomainEvent::TaskSubmitted { task_id }
            | DomainEvent::TaskStarted { task_id, .. }
            | DomainEvent::TaskCompleted { task_id, .. }
            | DomainEvent::RetryScheduled { task_id, .. }
            | DomainEvent::TaskDeadLettered { task_id, .. }
            | DomainEvent::TaskCancelled { task_id }
            | DomainEvent::OrphanReclaimed { task_id, .. }
            | DomainEvent::LeaseLost { task_id, .. } => *task_id,
        }
    }
}
