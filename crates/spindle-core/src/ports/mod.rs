//! Ports - the seams between the lifecycle engine and its collaborators.
//!
//! - `TaskStore`: durable task records and audit trail (conditional writes)
//! - `WorkChannel`: leased distribution of task ids
//! - `HeartbeatStore`: worker liveness records
//! - `TextProcessor`: the processing function
//! - `Clock`, `IdGenerator`, `EventSink`: time, ids, countable events

pub mod clock;
pub mod event_sink;
pub mod heartbeat_store;
pub mod id_generator;
pub mod processor;
pub mod task_store;
pub mod work_channel;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::heartbeat_store::HeartbeatStore;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::processor::TextProcessor;
pub use self::task_store::{ListQuery, StatusCounts, TaskPage, TaskStore};
pub use self::work_channel::{ChannelDepth, ChannelError, DeadLetter, Delivery, WorkChannel};
