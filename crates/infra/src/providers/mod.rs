//! External collaborators behind swappable provider interfaces.
//!
//! Orchestration logic only sees the traits; configuration selects the
//! implementation (real integrations in production, logging no-ops or
//! scriptable fakes everywhere else). Provider failures are classified
//! transient or permanent at the boundary and mapped onto activity errors.

pub mod authz;
pub mod dns;
pub mod notification;

use thiserror::Error;

use orgflow_events::ActivityError;

pub use authz::{AuthorizationContext, AuthorizationProvider, StaticAuthorizationProvider};
pub use dns::{DnsProvider, InMemoryDnsProvider, LoggingDnsProvider};
pub use notification::{
    InMemoryNotificationProvider, LoggingNotificationProvider, Notification,
    NotificationProvider,
};

/// Failure reported by a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Worth retrying: timeouts, throttling, propagation delays.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Retrying cannot help: invalid input, permission denied, hard limits.
    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }
}

impl From<ProviderError> for ActivityError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => ActivityError::transient(msg),
            ProviderError::Permanent(msg) => ActivityError::fatal(msg),
        }
    }
}

/// Which implementation set to wire up, selected by configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// Log-only no-ops; every call succeeds.
    #[default]
    Logging,
    /// In-memory scriptable fakes, for tests and local runs.
    InMemory,
}

/// The full provider set the saga layer consumes, built per `ProviderMode`.
pub struct ProviderSet {
    pub dns: std::sync::Arc<dyn DnsProvider>,
    pub notifications: std::sync::Arc<dyn NotificationProvider>,
    pub authorization: std::sync::Arc<dyn AuthorizationProvider>,
}

impl ProviderSet {
    pub fn for_mode(mode: ProviderMode) -> Self {
        use std::sync::Arc;
        match mode {
            ProviderMode::Logging => Self {
                dns: Arc::new(LoggingDnsProvider),
                notifications: Arc::new(LoggingNotificationProvider),
                authorization: Arc::new(StaticAuthorizationProvider),
            },
            ProviderMode::InMemory => Self {
                dns: Arc::new(InMemoryDnsProvider::new()),
                notifications: Arc::new(InMemoryNotificationProvider::new()),
                authorization: Arc::new(StaticAuthorizationProvider),
            },
        }
    }
}
