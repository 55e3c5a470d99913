//! spindle-core
//!
//! Task lifecycle engine: tasks move PENDING -> PROCESSING -> COMPLETED (or
//! through FAILED to a retry or the dead-letter channel) under optimistic
//! version checks, leased delivery and heartbeat-assisted orphan recovery.
//!
//! # Modules
//! - **domain**: task record, status graph, ids, retry decisions, events, errors
//! - **ports**: TaskStore, WorkChannel, HeartbeatStore, TextProcessor, Clock, ...
//! - **impls**: in-process implementations of the ports
//! - **app**: service, worker loop, orphan scanner, registry, engine wiring
//! - **config**: `EngineConfig`
//! - **observability**: tracing subscriber set-up

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{Engine, EngineBuilder, EngineHandle, TaskService, TaskView};
pub use config::EngineConfig;
pub use domain::{LifecycleError, TaskId, TaskOptions, TaskPayload, TaskStatus};
