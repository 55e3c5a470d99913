//! HeartbeatStore port - ephemeral worker liveness records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LifecycleError, WorkerHeartbeat, WorkerId};

/// Storage for heartbeats. Records are keyed by worker id and carry their
/// own TTL; the registry decides liveness from them.
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Insert or refresh the record for `heartbeat.worker_id`.
    async fn upsert(&self, heartbeat: WorkerHeartbeat) -> Result<(), LifecycleError>;

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerHeartbeat>, LifecycleError>;

    async fn remove(&self, worker_id: &WorkerId) -> Result<(), LifecycleError>;

    /// Remove the record only if it is still expired at `now`, checked
    /// atomically with the removal. A worker that beat in the meantime keeps
    /// its record. Returns whether a record was removed.
    async fn remove_if_stale(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError>;

    async fn all(&self) -> Result<Vec<WorkerHeartbeat>, LifecycleError>;
}
