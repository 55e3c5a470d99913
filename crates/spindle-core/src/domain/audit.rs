//! Audit trail: one entry per accepted status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::state::TaskStatus;
use super::task::Actor;

/// Append-only record of a transition. Never updated, never deleted.
///
/// Exists for post-mortem analysis; nothing in the engine reads it to make
/// decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub task_id: TaskId,
    pub old_status: TaskStatus,
    pub new_status: TaskStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Actor,

    /// Task version produced by this transition.
    pub version: u64,
}
