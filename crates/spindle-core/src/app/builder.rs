//! EngineBuilder - wiring and start-up validation.
//!
//! Every port defaults to its in-process implementation; callers swap in
//! their own with the `with_*` methods. `build()` validates the
//! configuration before anything runs.

use std::sync::Arc;

use super::context::EngineContext;
use super::handle::EngineHandle;
use super::reaper_loop::OrphanScanner;
use super::registry::WorkerRegistry;
use super::service::TaskService;
use super::worker_loop::WorkerLoop;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Decider, DefaultDecider, WorkerId};
use crate::impls::{
    InMemoryHeartbeatStore, InMemoryTaskStore, InMemoryWorkChannel, TracingEventSink,
    WordFrequencyProcessor,
};
use crate::ports::{
    Clock, EventSink, HeartbeatStore, IdGenerator, SystemClock, TaskStore, TextProcessor,
    UlidGenerator, WorkChannel,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// # Example
/// ```ignore
/// let engine = EngineBuilder::new(EngineConfig::default()).build()?;
/// let task_id = engine.service().submit(payload, options).await?;
/// let handle = engine.start();
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    store: Option<Arc<dyn TaskStore>>,
    channel: Option<Arc<dyn WorkChannel>>,
    heartbeats: Option<Arc<dyn HeartbeatStore>>,
    processor: Option<Arc<dyn TextProcessor>>,
    decider: Option<Arc<dyn Decider>>,
    events: Option<Arc<dyn EventSink>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            clock: None,
            ids: None,
            store: None,
            channel: None,
            heartbeats: None,
            processor: None,
            decider: None,
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn WorkChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_heartbeat_store(mut self, heartbeats: Arc<dyn HeartbeatStore>) -> Self {
        self.heartbeats = Some(heartbeats);
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn TextProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// # Errors
    /// `BuildError::Config` if the configuration does not validate.
    pub fn build(self) -> Result<Engine, BuildError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new(clock.clone())));
        let channel = self
            .channel
            .unwrap_or_else(|| Arc::new(InMemoryWorkChannel::new(ids.clone(), clock.clone())));
        let heartbeats = self
            .heartbeats
            .unwrap_or_else(|| Arc::new(InMemoryHeartbeatStore::new()));
        let processor = self.processor.unwrap_or_else(|| {
            Arc::new(WordFrequencyProcessor::new(&config.text.stop_words))
        });
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(config.retry_policy())));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        let registry =
            WorkerRegistry::new(heartbeats.clone(), clock.clone(), config.heartbeat_ttl());
        let ctx = EngineContext {
            config,
            store,
            channel,
            heartbeats,
            processor,
            decider,
            clock,
            ids,
            events,
        };
        Ok(Engine { ctx, registry })
    }
}

/// A wired engine. Hands out the service, individual loops for
/// single-step driving, or a running handle.
#[derive(Clone)]
pub struct Engine {
    ctx: EngineContext,
    registry: WorkerRegistry,
}

impl Engine {
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn service(&self) -> TaskService {
        TaskService::new(self.ctx.clone())
    }

    pub fn worker(&self, worker_id: WorkerId) -> WorkerLoop {
        WorkerLoop::new(worker_id, self.ctx.clone(), self.registry.clone())
    }

    pub fn scanner(&self) -> OrphanScanner {
        OrphanScanner::new(self.ctx.clone(), self.registry.clone())
    }

    /// Spawn `config.workers` workers (each with its heartbeat loop) and
    /// the orphan scanner. Must be called inside a tokio runtime.
    pub fn start(&self) -> EngineHandle {
        EngineHandle::spawn(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_with_defaults() {
        let engine = EngineBuilder::new(EngineConfig::default()).build().unwrap();
        assert_eq!(engine.config().workers, 4);
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.workers = 0;

        let result = EngineBuilder::new(config).build();
        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::Invalid { field: "workers", .. }))
        ));
    }
}
