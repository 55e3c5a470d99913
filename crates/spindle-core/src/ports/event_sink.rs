//! EventSink port - where domain events go.

use crate::domain::DomainEvent;

/// Receives every domain event. Must not block; sinks that ship events
/// elsewhere buffer internally.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}
