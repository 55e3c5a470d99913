//! InMemoryWorkChannel - development / test implementation of `WorkChannel`.
//!
//! - `ready`: ids deliverable now (best-effort FIFO)
//! - `delayed`: min-heap of ids waiting out a backoff
//! - `in_flight`: leased entries, invisible until acked, nacked or expired
//!
//! Deadlines use `tokio::time::Instant`, so tests with paused time can move
//! through backoffs and lease expiry without sleeping.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{LeaseToken, TaskId};
use crate::ports::{
    ChannelDepth, ChannelError, Clock, DeadLetter, Delivery, IdGenerator, WorkChannel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    task_id: TaskId,
    delivery_count: u32,
}

/// Delayed entry. Reverse ordering turns `BinaryHeap` into a min-heap.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    visible_at: Instant,
    entry: Entry,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .visible_at
            .cmp(&self.visible_at)
            .then_with(|| other.entry.task_id.cmp(&self.entry.task_id))
    }
}

#[derive(Debug)]
struct InFlight {
    entry: Entry,
    expires_at: Instant,
}

#[derive(Default)]
struct ChannelState {
    ready: VecDeque<Entry>,
    delayed: BinaryHeap<Scheduled>,
    in_flight: HashMap<LeaseToken, InFlight>,
    dead_letters: Vec<DeadLetter>,
}

impl ChannelState {
    /// Move due delayed entries and expired leases to `ready`.
    fn promote(&mut self, now: Instant) {
        while let Some(next) = self.delayed.peek() {
            if next.visible_at > now {
                break;
            }
            if let Some(due) = self.delayed.pop() {
                self.ready.push_back(due.entry);
            }
        }

        let expired: Vec<LeaseToken> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            if let Some(lease) = self.in_flight.remove(&token) {
                debug!(
                    task_id = %lease.entry.task_id,
                    lease = %token,
                    "lease expired, redelivering"
                );
                self.ready.push_back(lease.entry);
            }
        }
    }

    /// Earliest instant at which `promote` could change anything.
    fn next_wake(&self) -> Option<Instant> {
        let delayed = self.delayed.peek().map(|s| s.visible_at);
        let lease = self.in_flight.values().map(|l| l.expires_at).min();
        match (delayed, lease) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

pub struct InMemoryWorkChannel {
    state: Arc<Mutex<ChannelState>>,
    notify: Arc<Notify>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryWorkChannel {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState::default())),
            notify: Arc::new(Notify::new()),
            ids,
            clock,
        }
    }
}

#[async_trait]
impl WorkChannel for InMemoryWorkChannel {
    async fn enqueue(&self, task_id: TaskId, delay: Option<Duration>) -> Result<(), ChannelError> {
        let entry = Entry {
            task_id,
            delivery_count: 0,
        };
        let mut state = self.state.lock().await;
        match delay.filter(|d| !d.is_zero()) {
            Some(delay) => state.delayed.push(Scheduled {
                visible_at: Instant::now() + delay,
                entry,
            }),
            None => state.ready.push_back(entry),
        }
        drop(state);

        // wakes a waiting consumer, which recomputes its deadline
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(
        &self,
        lease_duration: Duration,
        wait: Duration,
    ) -> Result<Option<Delivery>, ChannelError> {
        let deadline = Instant::now() + wait;
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote(now);

                if let Some(mut entry) = state.ready.pop_front() {
                    entry.delivery_count += 1;
                    let lease_token = self.ids.generate_lease_token();
                    state.in_flight.insert(
                        lease_token,
                        InFlight {
                            entry,
                            expires_at: now + lease_duration,
                        },
                    );
                    return Ok(Some(Delivery {
                        task_id: entry.task_id,
                        lease_token,
                        delivery_count: entry.delivery_count,
                    }));
                }

                if now >= deadline {
                    return Ok(None);
                }
                state.next_wake().map_or(deadline, |at| at.min(deadline))
            };

            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(next_wake) => {},
            }
        }
    }

    async fn ack(&self, token: LeaseToken) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&token)
            .map(|_| ())
            .ok_or(ChannelError::UnknownLease(token))
    }

    async fn nack(&self, token: LeaseToken) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        let lease = state
            .in_flight
            .remove(&token)
            .ok_or(ChannelError::UnknownLease(token))?;
        state.ready.push_back(lease.entry);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, task_id: TaskId, reason: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        if state.dead_letters.iter().any(|d| d.task_id == task_id) {
            warn!(task_id = %task_id, "task already dead-lettered, ignoring");
            return Ok(());
        }
        state.dead_letters.push(DeadLetter {
            task_id,
            reason: reason.to_string(),
            dead_lettered_at: self.clock.now(),
        });
        Ok(())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, ChannelError> {
        Ok(self.state.lock().await.dead_letters.clone())
    }

    async fn contains(&self, task_id: TaskId) -> Result<bool, ChannelError> {
        let state = self.state.lock().await;
        Ok(state.ready.iter().any(|e| e.task_id == task_id)
            || state.delayed.iter().any(|s| s.entry.task_id == task_id)
            || state.in_flight.values().any(|l| l.entry.task_id == task_id))
    }

    async fn depth(&self) -> Result<ChannelDepth, ChannelError> {
        let state = self.state.lock().await;
        Ok(ChannelDepth {
            ready: state.ready.len(),
            delayed: state.delayed.len(),
            in_flight: state.in_flight.len(),
            dead_letters: state.dead_letters.len(),
        })
    }
}
