//! Event router: dispatches appended events to idempotent projection
//! processors, isolates poison events, and drives cascading re-emission.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, warn};

use orgflow_core::{ExpectedVersion, StreamId};
use orgflow_events::{DomainEvent, NewEvent};

use crate::event_store::{EventStore, EventStoreError};

/// A processor for one stream type.
///
/// Processors upsert projection rows (always setting `last_event_id`) and may
/// request cascading events by returning them; they never append to the
/// ledger themselves, so the router remains the only component that assigns
/// cascade versions (atomically, via the store).
pub trait EventProcessor: Send + Sync {
    /// Stream type this processor owns.
    fn stream_type(&self) -> &'static str;

    /// Exhaustive list of event types this processor handles; the registry is
    /// validated against the event catalog at startup.
    fn known_event_types(&self) -> &'static [&'static str];

    /// Apply the event to this processor's projections. Must be idempotent:
    /// reapplying the same event is a no-op. Returned events are cascade
    /// requests (e.g. grant revocations on partnership expiry) and must carry
    /// stable ids so re-emission deduplicates.
    fn process(&self, event: &DomainEvent) -> Result<Vec<NewEvent>, ProcessError>;
}

/// Failure while processing a single event. All variants poison the event
/// (recorded in `processing_error`) rather than blocking the stream.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("unknown event type {event_type} on stream type {stream_type}")]
    UnknownEventType {
        stream_type: String,
        event_type: String,
    },

    #[error("payload deserialization failed: {0}")]
    Deserialize(String),

    #[error("projection update failed: {0}")]
    Projection(String),
}

/// Router-level failure (not tied to one event's content).
#[derive(Debug, Error)]
pub enum RouterError {
    /// Registry does not cover the event catalog; refuse to start.
    #[error("processor registry incomplete: missing {0:?}")]
    IncompleteRegistry(Vec<(String, String)>),

    /// Bug sentinel: events must arrive in version order per stream.
    #[error("out-of-order event on stream {stream_id}/{stream_type}: last seen {last}, got {found}")]
    OutOfOrder {
        stream_id: StreamId,
        stream_type: String,
        last: u64,
        found: u64,
    },

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

/// What the router did with one event.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Projections updated; `cascaded` counts events emitted depth-first.
    Processed { cascaded: usize },
    /// Event was already processed (at-least-once redelivery); nothing done.
    AlreadyProcessed,
    /// Stream type is orchestration bookkeeping; acknowledged without
    /// projection work.
    Acknowledged,
    /// Event could not be processed; `processing_error` set, stream not
    /// blocked.
    Poisoned,
}

/// Dispatches events by stream type, then by event type.
///
/// Routing is explicit: a processor per stream type, plus an exception table
/// for the known producer bug class of events tagged with the wrong stream
/// type (forwarded to the owning processor, never dropped and never handled
/// by a default case).
pub struct EventRouter<S> {
    store: S,
    processors: HashMap<&'static str, Box<dyn EventProcessor>>,
    /// `(tagged stream_type, event_type) -> owning stream_type`.
    exceptions: HashMap<(String, String), &'static str>,
    /// Stream types acknowledged without projection work (saga bookkeeping).
    pass_through: HashSet<String>,
    /// Last dispatched version per stream; out-of-order arrival is a bug
    /// sentinel, never silently accepted.
    order: Mutex<HashMap<(StreamId, String), u64>>,
}

impl<S: EventStore> EventRouter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            processors: HashMap::new(),
            exceptions: HashMap::new(),
            pass_through: HashSet::new(),
            order: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(mut self, processor: Box<dyn EventProcessor>) -> Self {
        self.processors.insert(processor.stream_type(), processor);
        self
    }

    /// Declare a known mis-tagging: events of `event_type` arriving with
    /// `tagged_stream_type` are forwarded to `owning_stream_type`'s processor.
    pub fn with_routing_exception(
        mut self,
        tagged_stream_type: impl Into<String>,
        event_type: impl Into<String>,
        owning_stream_type: &'static str,
    ) -> Self {
        self.exceptions.insert(
            (tagged_stream_type.into(), event_type.into()),
            owning_stream_type,
        );
        self
    }

    /// Declare a stream type acknowledged without projection work.
    pub fn with_pass_through(mut self, stream_type: impl Into<String>) -> Self {
        self.pass_through.insert(stream_type.into());
        self
    }

    /// Validate the registry against the known event catalog. Run at startup:
    /// a catalog entry without a claiming processor is a configuration error,
    /// not a runtime poison event.
    pub fn validate_catalog(&self, catalog: &[(&str, &str)]) -> Result<(), RouterError> {
        let mut missing = Vec::new();
        for (stream_type, event_type) in catalog {
            let claimed = self
                .processors
                .get(stream_type)
                .map(|p| p.known_event_types().contains(event_type))
                .unwrap_or(false);
            if !claimed {
                missing.push((stream_type.to_string(), event_type.to_string()));
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RouterError::IncompleteRegistry(missing))
        }
    }

    /// Dispatch one event, then (depth-first) any events it cascaded.
    pub fn dispatch(&self, event: &DomainEvent) -> Result<DispatchOutcome, RouterError> {
        if event.is_processed() {
            return Ok(DispatchOutcome::AlreadyProcessed);
        }

        if self.pass_through.contains(&event.stream_type) {
            self.store.mark_processed(event.id)?;
            return Ok(DispatchOutcome::Acknowledged);
        }

        // Routing exception table: forward mis-tagged events to their owner.
        let key = (event.stream_type.clone(), event.event_type.clone());
        let effective = match self.exceptions.get(&key) {
            Some(owner) => {
                warn!(
                    event_id = %event.id,
                    tagged = %event.stream_type,
                    owner,
                    event_type = %event.event_type,
                    "forwarding mis-tagged event to owning processor"
                );
                *owner
            }
            None => event.stream_type.as_str(),
        };

        let Some(processor) = self.processors.get(effective) else {
            let error = format!("no processor registered for stream type '{effective}'");
            warn!(event_id = %event.id, %error, "poison event");
            self.store.mark_failed(event.id, &error)?;
            return Ok(DispatchOutcome::Poisoned);
        };

        self.check_order(event)?;

        match processor.process(event) {
            Ok(cascades) => {
                // Cascades land before the causing event is marked processed:
                // a failure here leaves it unprocessed, so recovery re-runs
                // the (idempotent) processor and re-derives the same stable
                // cascade ids instead of stranding the revocations.
                let mut cascaded = 0;
                for cascade in cascades {
                    cascaded += self.emit_cascade(cascade)?;
                }
                self.store.mark_processed(event.id)?;
                self.record_order(event);
                Ok(DispatchOutcome::Processed { cascaded })
            }
            Err(err) => {
                let error = err.to_string();
                warn!(event_id = %event.id, %error, "poison event");
                self.store.mark_failed(event.id, &error)?;
                Ok(DispatchOutcome::Poisoned)
            }
        }
    }

    /// Append a cascaded event (version assigned atomically on its own
    /// stream, independent of the causing stream) and dispatch it.
    fn emit_cascade(&self, cascade: NewEvent) -> Result<usize, RouterError> {
        // Stable cascade ids make re-emission detectable: if the event is
        // already in the ledger, the effect happened on a previous delivery.
        if self.store.get(cascade.id).is_ok() {
            debug!(event_id = %cascade.id, "cascade already emitted; skipping");
            return Ok(0);
        }

        let appended = self.store.append(cascade, ExpectedVersion::Any)?;
        let nested = match self.dispatch(&appended)? {
            DispatchOutcome::Processed { cascaded } => cascaded,
            _ => 0,
        };
        Ok(1 + nested)
    }

    fn check_order(&self, event: &DomainEvent) -> Result<(), RouterError> {
        let mut order = match self.order.lock() {
            Ok(o) => o,
            Err(_) => return Ok(()),
        };
        let key = (event.stream_id, event.stream_type.clone());
        let last = match order.get(&key) {
            Some(&last) => last,
            None => {
                // First observation of this stream (fresh router, e.g. after
                // a worker restart). Seed the cursor from the ledger's
                // bookkeeping so the sentinel holds across restarts.
                let seeded = self.seed_order(event)?;
                order.insert(key, seeded);
                seeded
            }
        };
        // Replays at or below the cursor are fine (idempotent processors);
        // a gap above it means delivery broke per-stream ordering.
        if event.stream_version > last + 1 {
            return Err(RouterError::OutOfOrder {
                stream_id: event.stream_id,
                stream_type: event.stream_type.clone(),
                last,
                found: event.stream_version,
            });
        }
        Ok(())
    }

    /// Highest contiguous stream version below `event` that is already
    /// accounted for (processed, or poisoned and awaiting the admin).
    fn seed_order(&self, event: &DomainEvent) -> Result<u64, RouterError> {
        let mut seeded = 0;
        for prior in self.store.load_stream(event.stream_id, &event.stream_type)? {
            if prior.stream_version >= event.stream_version {
                break;
            }
            if prior.is_processed() || prior.is_poisoned() {
                seeded = prior.stream_version;
            } else {
                break;
            }
        }
        Ok(seeded)
    }

    fn record_order(&self, event: &DomainEvent) {
        if let Ok(mut order) = self.order.lock() {
            let key = (event.stream_id, event.stream_type.clone());
            let entry = order.entry(key).or_insert(0);
            if event.stream_version > *entry {
                *entry = event.stream_version;
            }
        }
    }

    /// Drain and dispatch everything not yet processed, in append order.
    /// Used at startup recovery and by tests that bypass the worker.
    pub fn dispatch_unprocessed(&self) -> Result<usize, RouterError> {
        let mut handled = 0;
        for event in self.store.list_unprocessed()? {
            match self.dispatch(&event)? {
                DispatchOutcome::AlreadyProcessed => {}
                _ => handled += 1,
            }
        }
        Ok(handled)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
