//! Fixtures shared by the app tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::builder::{Engine, EngineBuilder};
use crate::config::EngineConfig;
use crate::domain::{Decider, Decision, FailureKind, ProcessingError, TaskOptions, TaskPayload};
use crate::impls::CountingEventSink;
use crate::ports::{FixedClock, TextProcessor};

/// Processor that replays queued answers, then succeeds.
#[derive(Default)]
pub struct ScriptedProcessor {
    answers: Mutex<VecDeque<Result<Value, ProcessingError>>>,
    calls: Mutex<usize>,
}

impl ScriptedProcessor {
    pub fn push(&self, answer: Result<Value, ProcessingError>) {
        self.answers.lock().push_back(answer);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl TextProcessor for ScriptedProcessor {
    async fn process(
        &self,
        _payload: &TaskPayload,
        _options: &TaskOptions,
    ) -> Result<Value, ProcessingError> {
        *self.calls.lock() += 1;
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({ "ok": true })))
    }
}

pub struct Fixture {
    pub engine: Engine,
    pub clock: Arc<FixedClock>,
    pub processor: Arc<ScriptedProcessor>,
    pub events: Arc<CountingEventSink>,
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.lease.dequeue_wait_ms = 0;
    config
}

/// Decider that asks for another attempt no matter how many were spent.
pub struct AlwaysRetry;

impl Decider for AlwaysRetry {
    fn decide(&self, retry_count: u32, _max_retries: u32, _failure: FailureKind) -> Decision {
        Decision::Retry {
            delay: std::time::Duration::ZERO,
            retry_count: retry_count + 1,
            reason: "always retry".to_string(),
        }
    }
}

pub fn fixture(config: EngineConfig) -> Fixture {
    fixture_with(config, |builder, _| builder)
}

/// Like `fixture`, with a hook to swap further ports before building. The
/// hook gets the fixture clock for ports that need one.
pub fn fixture_with(
    config: EngineConfig,
    customize: impl FnOnce(EngineBuilder, Arc<FixedClock>) -> EngineBuilder,
) -> Fixture {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
    ));
    let processor = Arc::new(ScriptedProcessor::default());
    let events = Arc::new(CountingEventSink::new());
    let builder = EngineBuilder::new(config)
        .with_clock(clock.clone())
        .with_processor(processor.clone())
        .with_event_sink(events.clone());
    let engine = customize(builder, clock.clone()).build().unwrap();
    Fixture {
        engine,
        clock,
        processor,
        events,
    }
}

pub fn payload() -> TaskPayload {
    TaskPayload::new("the quick brown fox jumps over the lazy dog")
}
