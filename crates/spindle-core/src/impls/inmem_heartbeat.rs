//! InMemoryHeartbeatStore - `HeartbeatStore` backed by a `DashMap`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{LifecycleError, WorkerHeartbeat, WorkerId};
use crate::ports::HeartbeatStore;

/// Heartbeats are written by every worker on every interval; sharded map,
/// no global lock.
#[derive(Default)]
pub struct InMemoryHeartbeatStore {
    records: DashMap<WorkerId, WorkerHeartbeat>,
}

impl InMemoryHeartbeatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartbeatStore for InMemoryHeartbeatStore {
    async fn upsert(&self, heartbeat: WorkerHeartbeat) -> Result<(), LifecycleError> {
        self.records.insert(heartbeat.worker_id.clone(), heartbeat);
        Ok(())
    }

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerHeartbeat>, LifecycleError> {
        Ok(self.records.get(worker_id).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, worker_id: &WorkerId) -> Result<(), LifecycleError> {
        self.records.remove(worker_id);
        Ok(())
    }

    async fn remove_if_stale(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        Ok(self
            .records
            .remove_if(worker_id, |_, hb| !hb.is_alive_at(now))
            .is_some())
    }

    async fn all(&self) -> Result<Vec<WorkerHeartbeat>, LifecycleError> {
        Ok(self.records.iter().map(|entry| entry.value().clone()).collect())
    }
}
