//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction over the ledger: one stream per
//! `(stream_id, stream_type)`, monotonic gapless versions assigned atomically
//! at append time, optimistic concurrency via `ExpectedVersion`, and the two
//! mutable bookkeeping fields the router maintains.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError};

use orgflow_core::ExpectedVersion;
use orgflow_events::{DomainEvent, EventBus, NewEvent};

/// Adapter that publishes committed events to an `EventBus` after a
/// successful append.
///
/// Ordering invariant: **publish happens only after append succeeds**, so a
/// published event is always durable and redelivery is safe.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<DomainEvent>,
{
    fn append(
        &self,
        event: NewEvent,
        expected_version: ExpectedVersion,
    ) -> Result<DomainEvent, EventStoreError> {
        // 1) Append (durable step)
        let committed = self.store.append(event, expected_version)?;

        // 2) Publish (best-effort; at-least-once acceptable)
        self.bus
            .publish(committed.clone())
            .map_err(|err| EventStoreError::Publish(format!("{err:?}")))?;

        Ok(committed)
    }

    fn load_stream(
        &self,
        stream_id: orgflow_core::StreamId,
        stream_type: &str,
    ) -> Result<Vec<DomainEvent>, EventStoreError> {
        self.store.load_stream(stream_id, stream_type)
    }

    fn get(&self, event_id: orgflow_core::EventId) -> Result<DomainEvent, EventStoreError> {
        self.store.get(event_id)
    }

    fn list_unprocessed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        self.store.list_unprocessed()
    }

    fn list_failed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        self.store.list_failed()
    }

    fn mark_processed(&self, event_id: orgflow_core::EventId) -> Result<(), EventStoreError> {
        self.store.mark_processed(event_id)
    }

    fn mark_failed(
        &self,
        event_id: orgflow_core::EventId,
        error: &str,
    ) -> Result<(), EventStoreError> {
        self.store.mark_failed(event_id, error)
    }

    fn clear_error(&self, event_id: orgflow_core::EventId) -> Result<(), EventStoreError> {
        self.store.clear_error(event_id)
    }

    fn dismiss(
        &self,
        event_id: orgflow_core::EventId,
        reason: &str,
    ) -> Result<(), EventStoreError> {
        self.store.dismiss(event_id, reason)
    }
}
