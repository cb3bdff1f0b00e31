//! `orgflow-events` — event-sourcing mechanics.
//!
//! Domain-agnostic building blocks for the ledger: the event record and its
//! metadata, trace-context propagation, the pub/sub bus abstraction, retry
//! policies, and the saga status vocabulary. Business semantics live in
//! `orgflow-orgs`; persistence and orchestration live in `orgflow-infra`.

pub mod bus;
pub mod in_memory_bus;
pub mod record;
pub mod retry;
pub mod saga;
pub mod trace;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use record::{DomainEvent, EventMetadata, NewEvent};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use saga::{ActivityError, SagaStatus, SagaStatusView, SagaWarning};
pub use trace::{SpanStatus, SpanTimer, TraceContext};
