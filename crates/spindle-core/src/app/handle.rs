//! EngineHandle - the running worker pool and scanner.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::builder::Engine;
use super::heartbeat_loop::HeartbeatLoop;
use crate::domain::WorkerId;

/// Handle to spawned background tasks.
/// - dropping it (or `request_shutdown`) stops every loop after its
///   current step
/// - `shutdown_and_join` waits for all of them
pub struct EngineHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub(crate) fn spawn(engine: &Engine) -> Self {
        let config = engine.config();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(config.workers + 1);
        for n in 0..config.workers {
            let worker = engine.worker(WorkerId::new(format!("worker-{n}")));
            let heartbeat = HeartbeatLoop::new(
                worker.worker_id().clone(),
                engine.registry().clone(),
                config.heartbeat_interval(),
                worker.current_task(),
            );
            let registry = engine.registry().clone();
            let shutdown = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                let worker_id = worker.worker_id().clone();

                // heartbeats outlive the worker's last attempt
                let (beat_stop_tx, beat_stop_rx) = watch::channel(false);
                let beats = tokio::spawn(heartbeat.run(beat_stop_rx));

                worker.run(shutdown).await;

                let _ = beat_stop_tx.send(true);
                if let Err(e) = beats.await {
                    warn!(worker_id = %worker_id, error = %e, "heartbeat task panicked");
                }
                if let Err(e) = registry.deregister(&worker_id).await {
                    warn!(worker_id = %worker_id, error = %e, "deregistration failed");
                }
            }));
        }

        let scanner = engine.scanner();
        joins.push(tokio::spawn(scanner.run(shutdown_rx)));

        info!(workers = config.workers, "engine started");
        Self { shutdown_tx, joins }
    }

    /// Stop taking new work. In-flight attempts are not interrupted.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "engine task panicked");
            }
        }
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use crate::app::test_support::{fixture, test_config};
    use std::time::Duration;

    #[tokio::test]
    async fn shutdown_joins_and_deregisters_every_worker() {
        let mut config = test_config();
        config.workers = 2;
        config.lease.dequeue_wait_ms = 10;
        let fx = fixture(config);

        let handle = fx.engine.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.engine.registry().live_workers().await.unwrap().len(), 2);

        handle.shutdown_and_join().await;
        assert!(fx.engine.registry().live_workers().await.unwrap().is_empty());
    }
}
