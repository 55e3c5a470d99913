//! OrphanScanner - recovers tasks whose worker stopped making progress.
//!
//! # Cycle (`scan_once`)
//! 1. PROCESSING tasks whose lease has expired, or whose owner the registry
//!    reports dead, are candidates.
//! 2. Each candidate is re-read and moved PROCESSING -> FAILED under the
//!    re-read version, then settled through the retry decision as a
//!    retryable failure.
//! 3. FAILED tasks nobody settled within the grace period (the worker died
//!    between recording the failure and settling it) are settled with the
//!    failure kind the worker recorded.
//! 4. PENDING tasks older than the grace period that the channel does not
//!    hold (an enqueue lost after the store write) are enqueued again.
//!
//! A lost conditional write means the owner finished first; the task is
//! counted as skipped. Errors on one task never stop the scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::context::EngineContext;
use super::registry::WorkerRegistry;
use super::settle::{Settlement, settle_failure};
use crate::domain::{
    Actor, DomainEvent, FailureKind, LifecycleError, Task, TaskMutation, TaskStatus,
};

/// Tally of one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// PROCESSING and FAILED tasks examined.
    pub scanned: usize,
    pub requeued: usize,
    pub dead_lettered: usize,

    /// PENDING tasks that had no channel entry and were enqueued again.
    pub redelivered: usize,

    /// Candidates someone else moved first.
    pub skipped: usize,
    pub errors: usize,
}

impl ScanReport {
    pub fn is_quiet(&self) -> bool {
        self.requeued + self.dead_lettered + self.redelivered + self.skipped + self.errors == 0
    }

    fn record(&mut self, result: Result<Reclaim, LifecycleError>, task: &Task) {
        match result {
            Ok(Reclaim::Settled(Settlement::Requeued { .. })) => self.requeued += 1,
            Ok(Reclaim::Settled(Settlement::DeadLettered { .. })) => self.dead_lettered += 1,
            Ok(Reclaim::Redelivered) => self.redelivered += 1,
            Ok(Reclaim::Skipped) => self.skipped += 1,
            Ok(Reclaim::NotCandidate) => {}
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "scanner could not recover task");
                self.errors += 1;
            }
        }
    }
}

#[derive(Debug)]
enum Reclaim {
    Settled(Settlement),
    Redelivered,
    Skipped,
    NotCandidate,
}

pub struct OrphanScanner {
    ctx: EngineContext,
    registry: WorkerRegistry,
    actor: Actor,
}

impl OrphanScanner {
    pub fn new(ctx: EngineContext, registry: WorkerRegistry) -> Self {
        let actor = Actor::Scanner(ctx.config.scanner.scanner_id.clone());
        Self {
            ctx,
            registry,
            actor,
        }
    }

    /// Override the actor recorded on scanner transitions.
    pub fn with_id(mut self, scanner_id: impl Into<String>) -> Self {
        self.actor = Actor::Scanner(scanner_id.into());
        self
    }

    /// One full cycle. Fails only if the candidate listing itself fails.
    pub async fn scan_once(&self) -> Result<ScanReport, LifecycleError> {
        let mut report = ScanReport::default();

        for task in self.ctx.store.find_by_status(TaskStatus::Processing).await? {
            report.scanned += 1;
            let result = self.reclaim(&task).await;
            report.record(result, &task);
        }

        let grace = chrono::Duration::from_std(self.ctx.config.unsettled_failure_grace())
            .unwrap_or(chrono::Duration::MAX);
        for task in self.ctx.store.find_by_status(TaskStatus::Failed).await? {
            report.scanned += 1;
            if self.ctx.clock.now() - task.updated_at < grace {
                continue;
            }
            let result = self.settle_unsettled(&task).await;
            report.record(result, &task);
        }

        for task in self.ctx.store.find_by_status(TaskStatus::Pending).await? {
            if self.ctx.clock.now() - task.updated_at < grace {
                continue;
            }
            let result = self.redeliver_stranded(&task).await;
            report.record(result, &task);
        }

        match self.registry.prune().await {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "pruned stale heartbeats"),
            Err(e) => warn!(error = %e, "heartbeat prune failed"),
        }

        Ok(report)
    }

    /// Why `task` should be taken back, if it should.
    async fn orphan_reason(&self, task: &Task, now: DateTime<Utc>) -> Option<String> {
        if task.status != TaskStatus::Processing {
            return None;
        }
        match task.lease_expires_at {
            None => return Some("processing without a lease".to_string()),
            Some(expires) if now > expires => {
                return Some(format!("lease expired at {}", expires.to_rfc3339()));
            }
            Some(_) => {}
        }

        if !self.ctx.config.scanner.reclaim_dead_owner_early {
            return None;
        }
        let owner = task.lease_owner.as_ref()?;
        match self.registry.is_alive(owner).await {
            Ok(true) => None,
            Ok(false) => Some(format!("owner {owner} stopped heartbeating")),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "liveness check failed, leaving task alone");
                None
            }
        }
    }

    async fn reclaim(&self, listed: &Task) -> Result<Reclaim, LifecycleError> {
        if self.orphan_reason(listed, self.ctx.clock.now()).await.is_none() {
            return Ok(Reclaim::NotCandidate);
        }

        // the listing may be stale; decide again on a fresh read
        let task = self.ctx.store.read(listed.id).await?;
        let Some(reason) = self.orphan_reason(&task, self.ctx.clock.now()).await else {
            return Ok(Reclaim::Skipped);
        };

        let failed = match self
            .ctx
            .store
            .write_if(
                task.id,
                task.version,
                TaskMutation::Fail {
                    error: format!("lease lost: {reason}"),
                    kind: FailureKind::Retryable,
                },
                self.actor.clone(),
            )
            .await
        {
            Ok(failed) => failed,
            Err(e) if e.is_conflict() => {
                debug!(task_id = %task.id, error = %e, "owner moved the task first");
                return Ok(Reclaim::Skipped);
            }
            Err(e) => return Err(e),
        };

        info!(
            task_id = %task.id,
            previous_owner = ?task.lease_owner,
            %reason,
            "orphaned task reclaimed"
        );
        self.ctx.emit(DomainEvent::OrphanReclaimed {
            task_id: task.id,
            previous_owner: task.lease_owner.clone(),
        });

        self.settle(&failed).await
    }

    async fn settle_unsettled(&self, listed: &Task) -> Result<Reclaim, LifecycleError> {
        info!(task_id = %listed.id, "settling failure left behind by a worker");
        self.settle(listed).await
    }

    async fn settle(&self, failed: &Task) -> Result<Reclaim, LifecycleError> {
        let kind = failed.failure_kind.unwrap_or(FailureKind::Retryable);
        match settle_failure(&self.ctx, failed, kind, self.actor.clone()).await {
            Ok(settlement) => Ok(Reclaim::Settled(settlement)),
            Err(e) if e.is_conflict() => Ok(Reclaim::Skipped),
            Err(e) => Err(e),
        }
    }

    async fn redeliver_stranded(&self, listed: &Task) -> Result<Reclaim, LifecycleError> {
        if self.ctx.channel.contains(listed.id).await? {
            return Ok(Reclaim::NotCandidate);
        }

        // a worker may have started it between the listing and the check
        let task = self.ctx.store.read(listed.id).await?;
        if task.status != TaskStatus::Pending || task.version != listed.version {
            return Ok(Reclaim::Skipped);
        }

        self.ctx.channel.enqueue(task.id, None).await?;
        info!(task_id = %task.id, "pending task had no channel entry, enqueued again");
        Ok(Reclaim::Redelivered)
    }

    /// Scan every `scan_interval` until `shutdown` flips to true or its
    /// sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.ctx.config.scan_interval();
        info!(interval_ms = interval.as_millis() as u64, "orphan scanner started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.scan_once().await {
                Ok(report) if report.is_quiet() => debug!(?report, "scan finished"),
                Ok(report) => info!(?report, "scan finished"),
                Err(e) => warn!(error = %e, "scan failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("orphan scanner stopped");
    }
}
