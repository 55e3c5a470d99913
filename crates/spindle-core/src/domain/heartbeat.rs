//! Worker liveness records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::task::WorkerId;

/// Ephemeral liveness signal. Not persisted beyond `ttl`, no audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    pub last_seen_at: DateTime<Utc>,
    pub current_task_id: Option<TaskId>,
    pub ttl: Duration,
}

impl WorkerHeartbeat {
    /// Alive while `now - last_seen_at < ttl`.
    pub fn is_alive_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now - self.last_seen_at < ttl,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn liveness_window_is_exclusive() {
        let seen = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let hb = WorkerHeartbeat {
            worker_id: WorkerId::new("w1"),
            last_seen_at: seen,
            current_task_id: None,
            ttl: Duration::from_secs(30),
        };

        assert!(hb.is_alive_at(seen + chrono::Duration::seconds(29)));
        assert!(!hb.is_alive_at(seen + chrono::Duration::seconds(30)));
    }
}
