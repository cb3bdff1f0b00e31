//! The domain-event record: the unit persisted in the append-only ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use orgflow_core::{ActorId, EventId, StreamId};

use crate::trace::TraceContext;

/// Metadata carried by every event.
///
/// `correlation_id` groups one logical business request across streams;
/// `causation_id` points at the event that caused this one. Together with the
/// W3C-style trace/span ids they allow timeline reconstruction across
/// asynchronous boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub actor: Option<ActorId>,
    pub reason: Option<String>,
    pub correlation_id: uuid::Uuid,
    pub causation_id: Option<EventId>,
    pub trace_id: String,
    pub span_id: String,
}

impl EventMetadata {
    /// Metadata derived from a trace context (the normal construction path).
    pub fn from_trace(trace: &TraceContext) -> Self {
        Self {
            actor: None,
            reason: None,
            correlation_id: trace.correlation_id(),
            causation_id: None,
            trace_id: trace.trace_id().to_string(),
            span_id: trace.span_id().to_string(),
        }
    }

    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Record which event caused this one (cascades, saga emissions).
    pub fn caused_by(mut self, event_id: EventId) -> Self {
        self.causation_id = Some(event_id);
        self
    }
}

/// An event ready to be appended to a stream (no version assigned yet).
///
/// The event store assigns `stream_version` during append; everything else is
/// fixed by the producer. `id` is producer-supplied and stable, so a retried
/// append can be deduplicated by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub id: EventId,
    pub stream_id: StreamId,
    pub stream_type: String,
    pub event_type: String,
    pub data: JsonValue,
    pub metadata: EventMetadata,
}

impl NewEvent {
    pub fn new(
        stream_id: StreamId,
        stream_type: impl Into<String>,
        event_type: impl Into<String>,
        data: JsonValue,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            id: EventId::new(),
            stream_id,
            stream_type: stream_type.into(),
            event_type: event_type.into(),
            data,
            metadata,
        }
    }

    /// Fix the event id explicitly (stable ids for idempotent re-emission).
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }
}

/// A persisted ledger event.
///
/// Immutable once stored, except for two bookkeeping fields maintained by the
/// router: `processing_error` (poison marker) and `processed_at`.
/// `(stream_id, stream_type, stream_version)` is unique; versions are
/// monotonic and gapless within a stream, assigned atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: EventId,
    pub stream_id: StreamId,
    pub stream_type: String,
    /// Monotonically increasing position in the stream, starting at 1.
    pub stream_version: u64,
    pub event_type: String,
    pub data: JsonValue,
    pub metadata: EventMetadata,
    pub created_at: DateTime<Utc>,

    /// Set when the router could not process this event (poison event).
    pub processing_error: Option<String>,
    /// Set when the router finished processing this event.
    pub processed_at: Option<DateTime<Utc>>,
}

impl DomainEvent {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn is_poisoned(&self) -> bool {
        self.processing_error.is_some() && self.processed_at.is_none()
    }
}
