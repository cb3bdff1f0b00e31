//! Organization stream: lifecycle and membership events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use orgflow_core::{ActorId, DomainError, StreamId};

use crate::catalog;

/// Organization lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    /// Created but not yet fully provisioned.
    Provisioning,
    Active,
    Deactivated,
}

/// Role a member holds within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

/// Payload: `organization.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationCreated {
    pub organization_id: StreamId,
    pub name: String,
    /// DNS-safe short name; doubles as the provisioned subdomain label.
    pub slug: String,
    pub owner: ActorId,
}

/// Payload: `organization.activated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationActivated {
    pub organization_id: StreamId,
    pub activated_at: DateTime<Utc>,
}

/// Payload: `organization.deactivated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationDeactivated {
    pub organization_id: StreamId,
    pub reason: String,
}

/// Payload: `organization.member_added`.
///
/// Membership is a junction between an organization and an actor; the pair
/// `(organization_id, member)` is unique in the read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberAdded {
    pub organization_id: StreamId,
    pub member: ActorId,
    pub role: MemberRole,
}

/// Payload: `organization.member_removed`.
///
/// Removal is an explicit event, never an implicit cascade-delete, so the
/// audit trail stays complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub organization_id: StreamId,
    pub member: ActorId,
    pub reason: Option<String>,
}

/// Typed view over organization-stream events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizationEvent {
    Created(OrganizationCreated),
    Activated(OrganizationActivated),
    Deactivated(OrganizationDeactivated),
    MemberAdded(MemberAdded),
    MemberRemoved(MemberRemoved),
}

impl OrganizationEvent {
    /// Event types this enum decodes, for registry validation.
    pub const EVENT_TYPES: &'static [&'static str] = &[
        catalog::ORGANIZATION_CREATED,
        catalog::ORGANIZATION_ACTIVATED,
        catalog::ORGANIZATION_DEACTIVATED,
        catalog::ORGANIZATION_MEMBER_ADDED,
        catalog::ORGANIZATION_MEMBER_REMOVED,
    ];

    /// Decode a ledger event's `(event_type, data)` pair.
    pub fn decode(event_type: &str, data: &JsonValue) -> Result<Self, DomainError> {
        let de =
            |e: serde_json::Error| DomainError::validation(format!("{event_type}: {e}"));
        match event_type {
            catalog::ORGANIZATION_CREATED => {
                Ok(Self::Created(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::ORGANIZATION_ACTIVATED => {
                Ok(Self::Activated(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::ORGANIZATION_DEACTIVATED => {
                Ok(Self::Deactivated(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::ORGANIZATION_MEMBER_ADDED => {
                Ok(Self::MemberAdded(serde_json::from_value(data.clone()).map_err(de)?))
            }
            catalog::ORGANIZATION_MEMBER_REMOVED => {
                Ok(Self::MemberRemoved(serde_json::from_value(data.clone()).map_err(de)?))
            }
            other => Err(DomainError::validation(format!(
                "unknown organization event type: {other}"
            ))),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => catalog::ORGANIZATION_CREATED,
            Self::Activated(_) => catalog::ORGANIZATION_ACTIVATED,
            Self::Deactivated(_) => catalog::ORGANIZATION_DEACTIVATED,
            Self::MemberAdded(_) => catalog::ORGANIZATION_MEMBER_ADDED,
            Self::MemberRemoved(_) => catalog::ORGANIZATION_MEMBER_REMOVED,
        }
    }

    pub fn encode(&self) -> JsonValue {
        match self {
            Self::Created(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::Activated(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::Deactivated(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::MemberAdded(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
            Self::MemberRemoved(p) => serde_json::to_value(p).unwrap_or(JsonValue::Null),
        }
    }
}
