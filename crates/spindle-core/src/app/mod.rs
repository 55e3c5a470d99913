//! App - the lifecycle engine built from the ports.
//!
//! # Components
//! - **EngineBuilder / Engine**: wiring and fail-fast validation
//! - **TaskService**: submit, status, list, cancel
//! - **WorkerLoop**: dequeue -> start -> process -> complete / fail -> ack
//! - **OrphanScanner**: reclaims expired or abandoned leases
//! - **WorkerRegistry / HeartbeatLoop**: worker liveness
//! - **EngineHandle**: running pool with coordinated shutdown

pub mod builder;
pub mod context;
pub mod handle;
pub mod heartbeat_loop;
pub mod reaper_loop;
pub mod registry;
pub mod service;
pub mod settle;
pub mod status;
pub mod worker_loop;

pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::context::EngineContext;
pub use self::handle::EngineHandle;
pub use self::heartbeat_loop::HeartbeatLoop;
pub use self::reaper_loop::{OrphanScanner, ScanReport};
pub use self::registry::WorkerRegistry;
pub use self::service::TaskService;
pub use self::settle::{Settlement, settle_failure};
pub use self::status::{Stats, TaskView};
pub use self::worker_loop::{RunOutcome, WorkerLoop};

#[cfg(test)]
pub(crate) mod test_support;
