//! Impls - in-process implementations of the ports.
//!
//! - **InMemoryTaskStore**: task records + audit log with version checks
//! - **InMemoryWorkChannel**: leased delivery with delays and dead letters
//! - **InMemoryHeartbeatStore**: worker liveness records
//! - **WordFrequencyProcessor**: the text analysis function
//! - event sinks for logging and counting
//!
//! Durable backends implement the same ports in their own crates.

pub mod event_sinks;
pub mod inmem_channel;
pub mod inmem_heartbeat;
pub mod inmem_store;
pub mod word_count;

pub use self::event_sinks::{CountingEventSink, FanoutEventSink, TracingEventSink};
pub use self::inmem_channel::InMemoryWorkChannel;
pub use self::inmem_heartbeat::InMemoryHeartbeatStore;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::word_count::{WordCount, WordFrequencyProcessor, WordFrequencyReport};
