//! Partnership stream: cross-organization agreements that authorize access
//! grants.
//!
//! Cascade invariant: no active grant may reference a non-active partnership.
//! Expiry and termination therefore trigger router-side revocation cascades
//! (see the partnership processor in infra).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use orgflow_core::{DomainError, StreamId};

use crate::catalog;

/// Partnership lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartnershipStatus {
    Active,
    Expired,
    Terminated,
}

impl PartnershipStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Payload: `partnership.established`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipEstablished {
    pub partnership_id: StreamId,
    pub organization_id: StreamId,
    pub partner_organization_id: StreamId,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload: `partnership.expired`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipExpired {
    pub partnership_id: StreamId,
    pub expired_at: DateTime<Utc>,
}

/// Payload: `partnership.terminated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnershipTerminated {
    pub partnership_id: StreamId,
    pub reason: String,
}

/// Typed view over partnership-stream events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnershipEvent {
    Established(PartnershipEstablished),
    Expired(PartnershipExpired),
    Terminated(PartnershipTerminated),
}

impl PartnershipEvent {
    /// Event types this enum decodes, for registry validation.
    pub const EVENT_TYPES: &'static [&'static str] = &[
        catalog::PARTNERSHIP_ESTABLISHED,
        catalog::PARTNERSHIP_EXPIRED,
        catalog::PARTNERSHIP_TERMINATED,
    ];

    pub fn decode(event_type: &str, data: &JsonValue) -> Result<Self, DomainError> {
        let de =
            |e: serde_json::Error| DomainError::validation(format!("{event_type}: {e}"));
        match event_type {
            catalog::PARTNERSHIP_ESTABLISHED => {
                Ok(Self::Established(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::PARTNERSHIP_EXPIRED => {
                Ok(Self::Expired(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::PARTNERSHIP_TERMINATED => {
                Ok(Self::Terminated(serde_json::from_value(data.clone()).map_err(de)?))
            }
            other => Err(DomainError::validation(format!(
                "unknown partnership event type: {other}"
            ))),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Established(_) => catalog::PARTNERSHIP_ESTABLISHED,
            Self::Expired(_) => catalog::PARTNERSHIP_EXPIRED,
            Self::Terminated(_) => catalog::PARTNERSHIP_TERMINATED,
        }
    }

    pub fn encode(&self) -> JsonValue {
        match self {
            Self::Established(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::Expired(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::Terminated(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
        }
    }
}
