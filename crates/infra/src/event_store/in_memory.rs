//! In-memory append-only event store.

use std::collections::HashMap;
use std::sync::RwLock;

use orgflow_core::{EventId, ExpectedVersion, StreamId};
use orgflow_events::{DomainEvent, NewEvent};

use super::r#trait::{now, validate_new_event, EventStore, EventStoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    stream_id: StreamId,
    stream_type: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// Stream index: version-ordered event ids per stream.
    streams: HashMap<StreamKey, Vec<EventId>>,
    /// All events by id, including bookkeeping fields.
    events: HashMap<EventId, DomainEvent>,
    /// Append order, for unprocessed/failed scans.
    log: Vec<EventId>,
}

/// In-memory event store.
///
/// Intended for tests/dev; the trait leaves room for SQL backends. The write
/// lock is the serialization point the concurrency model requires: version
/// computation and insertion happen under one guard, so concurrent writers
/// race on `ExpectedVersion`, never on version assignment.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> EventStoreError {
        EventStoreError::InvalidAppend("lock poisoned".to_string())
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        event: NewEvent,
        expected_version: ExpectedVersion,
    ) -> Result<DomainEvent, EventStoreError> {
        validate_new_event(&event)?;

        let key = StreamKey {
            stream_id: event.stream_id,
            stream_type: event.stream_type.clone(),
        };

        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;

        if inner.events.contains_key(&event.id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "duplicate event id: {}",
                event.id
            )));
        }

        // Atomic read-then-insert: everything below happens under the write
        // guard, so the assigned version is always max(existing) + 1.
        let current = inner
            .streams
            .get(&key)
            .map(|ids| ids.len() as u64)
            .unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream {}/{} at version {current}, expected {expected_version:?}",
                key.stream_id, key.stream_type
            )));
        }

        let stored = DomainEvent {
            id: event.id,
            stream_id: event.stream_id,
            stream_type: event.stream_type,
            stream_version: current + 1,
            event_type: event.event_type,
            data: event.data,
            metadata: event.metadata,
            created_at: now(),
            processing_error: None,
            processed_at: None,
        };

        inner.streams.entry(key).or_default().push(stored.id);
        inner.log.push(stored.id);
        inner.events.insert(stored.id, stored.clone());

        Ok(stored)
    }

    fn load_stream(
        &self,
        stream_id: StreamId,
        stream_type: &str,
    ) -> Result<Vec<DomainEvent>, EventStoreError> {
        let key = StreamKey {
            stream_id,
            stream_type: stream_type.to_string(),
        };

        let inner = self.inner.read().map_err(|_| Self::lock_err())?;

        Ok(inner
            .streams
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.events.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&self, event_id: EventId) -> Result<DomainEvent, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        inner
            .events
            .get(&event_id)
            .cloned()
            .ok_or(EventStoreError::NotFound(event_id))
    }

    fn list_unprocessed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner
            .log
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| e.processed_at.is_none())
            .cloned()
            .collect())
    }

    fn list_failed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| Self::lock_err())?;
        Ok(inner
            .log
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| e.is_poisoned())
            .cloned()
            .collect())
    }

    fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        let ev = inner
            .events
            .get_mut(&event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        ev.processed_at = Some(now());
        ev.processing_error = None;
        Ok(())
    }

    fn mark_failed(&self, event_id: EventId, error: &str) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        let ev = inner
            .events
            .get_mut(&event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        ev.processing_error = Some(error.to_string());
        Ok(())
    }

    fn clear_error(&self, event_id: EventId) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        let ev = inner
            .events
            .get_mut(&event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        ev.processing_error = None;
        Ok(())
    }

    fn dismiss(&self, event_id: EventId, reason: &str) -> Result<(), EventStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_err())?;
        let ev = inner
            .events
            .get_mut(&event_id)
            .ok_or(EventStoreError::NotFound(event_id))?;
        ev.processing_error = Some(format!("dismissed: {reason}"));
        ev.processed_at = Some(now());
        Ok(())
    }
}
