//! `orgflow-core` — foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the optimistic-concurrency model for event streams, and
//! the domain error taxonomy.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{ActorId, EventId, SagaId, StreamId};
pub use version::ExpectedVersion;
