//! HeartbeatLoop - periodic liveness signal for one worker.

use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use super::registry::WorkerRegistry;
use crate::domain::{TaskId, WorkerId};

/// Beats every `interval` with whatever task the worker currently holds.
pub struct HeartbeatLoop {
    worker_id: WorkerId,
    registry: WorkerRegistry,
    interval: Duration,
    current_task: watch::Receiver<Option<TaskId>>,
}

impl HeartbeatLoop {
    pub fn new(
        worker_id: WorkerId,
        registry: WorkerRegistry,
        interval: Duration,
        current_task: watch::Receiver<Option<TaskId>>,
    ) -> Self {
        Self {
            worker_id,
            registry,
            interval,
            current_task,
        }
    }

    /// One heartbeat.
    pub async fn beat_once(&self) {
        let current = *self.current_task.borrow();
        if let Err(e) = self.registry.beat(&self.worker_id, current).await {
            warn!(worker_id = %self.worker_id, error = %e, "heartbeat failed");
        }
    }

    /// Beat until `shutdown` flips to true or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.beat_once().await;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryHeartbeatStore;
    use crate::ports::{HeartbeatStore, SystemClock};
    use std::sync::Arc;
    use ulid::Ulid;

    #[tokio::test(start_paused = true)]
    async fn beats_with_current_task_until_shutdown() {
        let store = Arc::new(InMemoryHeartbeatStore::new());
        let registry =
            WorkerRegistry::new(store.clone(), Arc::new(SystemClock), Duration::from_secs(30));
        let (task_tx, task_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker_id = WorkerId::new("w1");

        let heartbeat =
            HeartbeatLoop::new(worker_id.clone(), registry, Duration::from_secs(10), task_rx);
        let join = tokio::spawn(heartbeat.run(stop_rx));

        tokio::time::sleep(Duration::from_millis(1)).await;
        let first = store.get(&worker_id).await.unwrap().unwrap();
        assert_eq!(first.current_task_id, None);

        let task_id = TaskId::from_ulid(Ulid::new());
        task_tx.send_replace(Some(task_id));
        tokio::time::sleep(Duration::from_secs(11)).await;

        let second = store.get(&worker_id).await.unwrap().unwrap();
        assert_eq!(second.current_task_id, Some(task_id));

        stop_tx.send_replace(true);
        join.await.unwrap();
    }
}
