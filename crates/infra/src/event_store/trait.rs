//! Append-only ledger boundary.

use chrono::{DateTime, Utc};
use thiserror::Error;

use orgflow_core::{EventId, ExpectedVersion, StreamId};
use orgflow_events::{DomainEvent, NewEvent};

/// Event store operation error.
///
/// Infrastructure errors only (storage, concurrency, malformed appends);
/// domain failures live in `orgflow_core::DomainError`.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Append-time version race; retryable by the caller after recomputing.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// Malformed event (permanent; never retried automatically).
    #[error("event validation failed: {0}")]
    Validation(String),

    /// Referenced event does not exist.
    #[error("event not found: {0}")]
    NotFound(EventId),

    /// Invalid store state or append input.
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// Event publication failed (after successful append).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EventStoreError {
    /// Whether the caller may retry the operation (after recomputing its
    /// expected version).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

/// Append-only event store: one stream per `(stream_id, stream_type)`.
///
/// Implementations must:
/// - serialize read-then-insert per stream so `stream_version` is assigned
///   atomically as `max(existing) + 1` (gapless, no duplicates)
/// - enforce the optimistic concurrency expectation before assigning
/// - reject malformed events with `Validation` (permanent) rather than
///   storing them
/// - treat events as immutable apart from the two router bookkeeping fields
///   (`processing_error`, `processed_at`)
///
/// Ordering is guaranteed within one stream only. Callers needing causal
/// ordering across streams carry `correlation_id`/`causation_id` in metadata.
pub trait EventStore: Send + Sync {
    /// Append one event; returns it with its assigned version.
    fn append(
        &self,
        event: NewEvent,
        expected_version: ExpectedVersion,
    ) -> Result<DomainEvent, EventStoreError>;

    /// Load the full stream in version order (empty if the stream does not
    /// exist yet).
    fn load_stream(
        &self,
        stream_id: StreamId,
        stream_type: &str,
    ) -> Result<Vec<DomainEvent>, EventStoreError>;

    /// Fetch a single event by id.
    fn get(&self, event_id: EventId) -> Result<DomainEvent, EventStoreError>;

    /// Events not yet marked processed, in append order.
    fn list_unprocessed(&self) -> Result<Vec<DomainEvent>, EventStoreError>;

    /// Poison events: `processing_error` set, not yet processed. The
    /// administrative surface scans these; business logic never does.
    fn list_failed(&self) -> Result<Vec<DomainEvent>, EventStoreError>;

    /// Router bookkeeping: record successful processing.
    fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError>;

    /// Router bookkeeping: record a processing failure (poison marker).
    fn mark_failed(&self, event_id: EventId, error: &str) -> Result<(), EventStoreError>;

    /// Administrative: clear the poison marker ahead of a manual retry.
    fn clear_error(&self, event_id: EventId) -> Result<(), EventStoreError>;

    /// Administrative: acknowledge a poison event without reprocessing it.
    /// Keeps the audit trail (`processing_error` becomes `dismissed: reason`).
    fn dismiss(&self, event_id: EventId, reason: &str) -> Result<(), EventStoreError>;
}

impl<S> EventStore for std::sync::Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        event: NewEvent,
        expected_version: ExpectedVersion,
    ) -> Result<DomainEvent, EventStoreError> {
        (**self).append(event, expected_version)
    }

    fn load_stream(
        &self,
        stream_id: StreamId,
        stream_type: &str,
    ) -> Result<Vec<DomainEvent>, EventStoreError> {
        (**self).load_stream(stream_id, stream_type)
    }

    fn get(&self, event_id: EventId) -> Result<DomainEvent, EventStoreError> {
        (**self).get(event_id)
    }

    fn list_unprocessed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        (**self).list_unprocessed()
    }

    fn list_failed(&self) -> Result<Vec<DomainEvent>, EventStoreError> {
        (**self).list_failed()
    }

    fn mark_processed(&self, event_id: EventId) -> Result<(), EventStoreError> {
        (**self).mark_processed(event_id)
    }

    fn mark_failed(&self, event_id: EventId, error: &str) -> Result<(), EventStoreError> {
        (**self).mark_failed(event_id, error)
    }

    fn clear_error(&self, event_id: EventId) -> Result<(), EventStoreError> {
        (**self).clear_error(event_id)
    }

    fn dismiss(&self, event_id: EventId, reason: &str) -> Result<(), EventStoreError> {
        (**self).dismiss(event_id, reason)
    }
}

/// Validation applied to every append, independent of backend.
pub(crate) fn validate_new_event(event: &NewEvent) -> Result<(), EventStoreError> {
    if event.stream_type.trim().is_empty() {
        return Err(EventStoreError::Validation("empty stream_type".into()));
    }
    if event.event_type.trim().is_empty() {
        return Err(EventStoreError::Validation("empty event_type".into()));
    }
    if !event.data.is_object() {
        return Err(EventStoreError::Validation(format!(
            "event data must be a JSON object (event_type: {})",
            event.event_type
        )));
    }
    if event.metadata.trace_id.len() != 32 {
        return Err(EventStoreError::Validation(format!(
            "trace_id must be 32 hex chars, got {}",
            event.metadata.trace_id.len()
        )));
    }
    if event.metadata.span_id.len() != 16 {
        return Err(EventStoreError::Validation(format!(
            "span_id must be 16 hex chars, got {}",
            event.metadata.span_id.len()
        )));
    }
    Ok(())
}

/// Helper: stamp used for bookkeeping mutations.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
