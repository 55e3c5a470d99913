//! Shared handles every engine component is built from.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::domain::{Decider, DomainEvent};
use crate::ports::{
    Clock, EventSink, HeartbeatStore, IdGenerator, TaskStore, TextProcessor, WorkChannel,
};

/// Cheap to clone; all fields are shared.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub store: Arc<dyn TaskStore>,
    pub channel: Arc<dyn WorkChannel>,
    pub heartbeats: Arc<dyn HeartbeatStore>,
    pub processor: Arc<dyn TextProcessor>,
    pub decider: Arc<dyn Decider>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub events: Arc<dyn EventSink>,
}

impl EngineContext {
    pub fn emit(&self, event: DomainEvent) {
        self.events.emit(&event);
    }
}
