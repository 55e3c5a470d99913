//! EventSink implementations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::domain::{DomainEvent, EventKind};
use crate::ports::EventSink;

/// Writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        let kind = event.kind();
        match serde_json::to_string(event) {
            Ok(json) => info!(task_id = %event.task_id(), ?kind, event = %json, "domain event"),
            Err(_) => info!(task_id = %event.task_id(), ?kind, "domain event"),
        }
    }
}

/// Counts events per kind.
#[derive(Debug, Default)]
pub struct CountingEventSink {
    counts: Mutex<HashMap<EventKind, u64>>,
}

impl CountingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }
}

impl EventSink for CountingEventSink {
    fn emit(&self, event: &DomainEvent) {
        *self.counts.lock().entry(event.kind()).or_insert(0) += 1;
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &DomainEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
