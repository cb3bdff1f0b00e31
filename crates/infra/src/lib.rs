//! `orgflow-infra` — storage, routing, orchestration and providers.
//!
//! This crate wires the mechanics together: the append-only event store, the
//! router with its idempotent projections and poison-event handling, the
//! durable saga orchestrator (with the organization provisioning saga), the
//! provider boundaries, and the background workers.

pub mod admin;
pub mod event_store;
pub mod projections;
pub mod providers;
pub mod read_model;
pub mod router;
pub mod saga;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use admin::EventAdmin;
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, PublishingEventStore};
pub use router::{DispatchOutcome, EventProcessor, EventRouter, ProcessError, RouterError};
pub use saga::{SagaDefinition, SagaError, SagaOrchestrator, SagaStep, StepContext, StepOutcome};
