//! WorkChannel port - distribution of task ids to workers.
//!
//! The channel carries task ids only; state and payload live in the
//! `TaskStore`. A dequeue hands out a lease: the entry stays invisible to
//! other workers until it is acked, nacked, or the lease runs out, after which
//! it is delivered again. Redelivery is at-least-once; the store decides
//! whether a redelivered task actually needs work.
//!
//! A task the store holds as PENDING is expected to have an entry here. An
//! implementation that can lose entries (a failed `enqueue` after the store
//! write, a restart without durable storage) relies on the orphan scanner,
//! which re-enqueues PENDING tasks that `contains` does not know about.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LeaseToken, TaskId};

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Token never issued, already acked/nacked, or its lease ran out.
    #[error("unknown or expired lease: {0}")]
    UnknownLease(LeaseToken),

    #[error("channel operation failed: {0}")]
    OperationFailed(String),
}

/// One leased delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task_id: TaskId,
    pub lease_token: LeaseToken,

    /// How many times this entry has been handed out, including this one.
    pub delivery_count: u32,
}

/// Entry in the dead-letter channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub task_id: TaskId,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDepth {
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub dead_letters: usize,
}

#[async_trait]
pub trait WorkChannel: Send + Sync {
    /// Make `task_id` deliverable, after `delay` if given.
    async fn enqueue(&self, task_id: TaskId, delay: Option<Duration>) -> Result<(), ChannelError>;

    /// Lease one entry for `lease_duration`. Waits up to `wait` for one to
    /// become available; `None` means nothing arrived in time.
    async fn dequeue(
        &self,
        lease_duration: Duration,
        wait: Duration,
    ) -> Result<Option<Delivery>, ChannelError>;

    /// Remove the leased entry for good.
    async fn ack(&self, token: LeaseToken) -> Result<(), ChannelError>;

    /// Give the leased entry back for immediate redelivery.
    async fn nack(&self, token: LeaseToken) -> Result<(), ChannelError>;

    /// Route a task id to the dead-letter channel. Entries are kept for
    /// inspection, never redelivered.
    async fn dead_letter(&self, task_id: TaskId, reason: &str) -> Result<(), ChannelError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, ChannelError>;

    /// Is `task_id` ready, delayed or leased? Dead letters do not count.
    async fn contains(&self, task_id: TaskId) -> Result<bool, ChannelError>;

    async fn depth(&self) -> Result<ChannelDepth, ChannelError>;
}
