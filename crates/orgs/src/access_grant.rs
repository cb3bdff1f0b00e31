//! Access-grant stream: scoped access authorized by an active partnership.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use orgflow_core::{ActorId, DomainError, StreamId};

use crate::catalog;

/// Access-grant lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Revoked,
}

/// What a grant permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    ReadOnly,
    ReadWrite,
    Admin,
}

/// Payload: `access_grant.issued`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrantIssued {
    pub grant_id: StreamId,
    /// The partnership that authorizes this grant. When the partnership
    /// stops being active, the grant must be revoked (cascade invariant).
    pub partnership_id: StreamId,
    pub organization_id: StreamId,
    pub grantee: ActorId,
    pub scope: GrantScope,
}

/// Payload: `access_grant.revoked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrantRevoked {
    pub grant_id: StreamId,
    pub reason: String,
}

/// Typed view over access-grant-stream events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessGrantEvent {
    Issued(AccessGrantIssued),
    Revoked(AccessGrantRevoked),
}

impl AccessGrantEvent {
    /// Event types this enum decodes, for registry validation.
    pub const EVENT_TYPES: &'static [&'static str] =
        &[catalog::ACCESS_GRANT_ISSUED, catalog::ACCESS_GRANT_REVOKED];

    pub fn decode(event_type: &str, data: &JsonValue) -> Result<Self, DomainError> {
        let de =
            |e: serde_json::Error| DomainError::validation(format!("{event_type}: {e}"));
        match event_type {
            catalog::ACCESS_GRANT_ISSUED => {
                Ok(Self::Issued(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::ACCESS_GRANT_REVOKED => {
                Ok(Self::Revoked(serde_json::from_value(data.clone()).map_err(de)?))
            }
            other => Err(DomainError::validation(format!(
                "unknown access grant event type: {other}"
            ))),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Issued(_) => catalog::ACCESS_GRANT_ISSUED,
            Self::Revoked(_) => catalog::ACCESS_GRANT_REVOKED,
        }
    }

    pub fn encode(&self) -> JsonValue {
        match self {
            Self::Issued(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::Revoked(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
        }
    }
}
