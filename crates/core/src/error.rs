//! Error model shared by the domain crates.

use thiserror::Error;

/// Result alias for domain-layer fallible operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic domain failure.
///
/// Covers malformed values and identifiers that fail to parse. Infrastructure
/// failures (storage, concurrency, routing, saga execution) live in the
/// crates that own that infrastructure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A payload or value failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
