//! Read model storage abstractions.
//!
//! Projection rows live behind this seam so in-memory state (tests/dev) and
//! future SQL backends are interchangeable. Rows are written **only** by the
//! router; callers query through the projections' accessors.

pub mod projection_store;

pub use projection_store::{InMemoryProjectionStore, ProjectionStore};
