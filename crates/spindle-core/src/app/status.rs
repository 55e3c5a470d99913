//! Read models returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskId, TaskOptions, TaskStatus};
use crate::ports::{ChannelDepth, StatusCounts};

/// What a caller sees of a task. The payload text is left out; only its
/// size is reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    pub options: TaskOptions,
    pub payload_bytes: usize,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub version: u64,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            status: task.status,
            options: task.options.clone(),
            payload_bytes: task.payload.text.len(),
            result: task.result.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            updated_at: task.updated_at,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            version: task.version,
        }
    }
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self::from(&task)
    }
}

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub tasks: StatusCounts,
    pub channel: ChannelDepth,
}
