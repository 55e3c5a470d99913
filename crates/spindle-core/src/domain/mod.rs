//! Domain model (ids, task record, status graph, retry decisions, events).

pub mod audit;
pub mod decision;
pub mod errors;
pub mod events;
pub mod heartbeat;
pub mod ids;
pub mod retry;
pub mod state;
pub mod task;

pub use audit::AuditLogEntry;
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{FailureKind, LifecycleError, ProcessingError};
pub use events::{DomainEvent, EventKind};
pub use heartbeat::WorkerHeartbeat;
pub use ids::{LeaseToken, ParseIdError, TaskId};
pub use retry::RetryPolicy;
pub use state::{IllegalTransition, TaskStatus, validate_transition};
pub use task::{Actor, Task, TaskMutation, TaskOptions, TaskPayload, WorkerId};
