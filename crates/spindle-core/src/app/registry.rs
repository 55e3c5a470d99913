//! WorkerRegistry - liveness view over the heartbeat store.
//!
//! Advisory only. A worker judged dead here may still be running; the
//! lease and the version check are what actually keep two workers from
//! completing the same task.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{LifecycleError, TaskId, WorkerHeartbeat, WorkerId};
use crate::ports::{Clock, HeartbeatStore};

#[derive(Clone)]
pub struct WorkerRegistry {
    store: Arc<dyn HeartbeatStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl WorkerRegistry {
    /// `ttl` is `heartbeat_interval * missed_intervals`.
    pub fn new(store: Arc<dyn HeartbeatStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub async fn register(&self, worker_id: &WorkerId) -> Result<(), LifecycleError> {
        debug!(worker_id = %worker_id, "worker registered");
        self.beat(worker_id, None).await
    }

    pub async fn beat(
        &self,
        worker_id: &WorkerId,
        current_task_id: Option<TaskId>,
    ) -> Result<(), LifecycleError> {
        self.store
            .upsert(WorkerHeartbeat {
                worker_id: worker_id.clone(),
                last_seen_at: self.clock.now(),
                current_task_id,
                ttl: self.ttl,
            })
            .await
    }

    pub async fn deregister(&self, worker_id: &WorkerId) -> Result<(), LifecycleError> {
        debug!(worker_id = %worker_id, "worker deregistered");
        self.store.remove(worker_id).await
    }

    /// Unknown workers are dead.
    pub async fn is_alive(&self, worker_id: &WorkerId) -> Result<bool, LifecycleError> {
        let now = self.clock.now();
        Ok(self
            .store
            .get(worker_id)
            .await?
            .is_some_and(|hb| hb.is_alive_at(now)))
    }

    pub async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, LifecycleError> {
        let now = self.clock.now();
        let mut live: Vec<WorkerHeartbeat> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|hb| hb.is_alive_at(now))
            .collect();
        live.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(live)
    }

    /// Drop records past their TTL. Returns how many were removed.
    pub async fn prune(&self) -> Result<usize, LifecycleError> {
        let now = self.clock.now();
        let mut removed = 0;
        for hb in self.store.all().await? {
            // the worker may beat between the listing and the removal
            if !hb.is_alive_at(now) && self.store.remove_if_stale(&hb.worker_id, now).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryHeartbeatStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    fn setup() -> (WorkerRegistry, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let registry = WorkerRegistry::new(
            Arc::new(InMemoryHeartbeatStore::new()),
            clock.clone(),
            Duration::from_secs(30),
        );
        (registry, clock)
    }

    #[tokio::test]
    async fn alive_until_ttl_passes() {
        let (registry, clock) = setup();
        let w1 = WorkerId::new("w1");
        registry.register(&w1).await.unwrap();

        clock.advance(Duration::from_secs(29));
        assert!(registry.is_alive(&w1).await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!registry.is_alive(&w1).await.unwrap());
    }

    #[tokio::test]
    async fn beat_extends_liveness() {
        let (registry, clock) = setup();
        let w1 = WorkerId::new("w1");
        registry.register(&w1).await.unwrap();

        clock.advance(Duration::from_secs(20));
        registry.beat(&w1, None).await.unwrap();
        clock.advance(Duration::from_secs(20));

        assert!(registry.is_alive(&w1).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_and_deregistered_workers_are_dead() {
        let (registry, _clock) = setup();
        let w1 = WorkerId::new("w1");
        assert!(!registry.is_alive(&w1).await.unwrap());

        registry.register(&w1).await.unwrap();
        registry.deregister(&w1).await.unwrap();
        assert!(!registry.is_alive(&w1).await.unwrap());
    }

    #[tokio::test]
    async fn live_workers_and_prune() {
        let (registry, clock) = setup();
        registry.register(&WorkerId::new("old")).await.unwrap();
        clock.advance(Duration::from_secs(40));
        registry.register(&WorkerId::new("new")).await.unwrap();

        let live = registry.live_workers().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].worker_id, WorkerId::new("new"));

        assert_eq!(registry.prune().await.unwrap(), 1);
        assert!(registry.live_workers().await.unwrap().len() == 1);
    }
}
