//! Strongly-typed identifiers used across the system.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of an event stream (one entity's full history).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(Uuid);

/// Identifier of a single ledger event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

/// Identifier of a saga instance.
///
/// Saga ids are derived deterministically from a business key (see
/// [`SagaId::for_business_key`]) so re-invocation attaches to the existing
/// instance instead of duplicating it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

/// Identifier of an acting principal (user or service).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(StreamId, "StreamId");
impl_uuid_newtype!(EventId, "EventId");
impl_uuid_newtype!(SagaId, "SagaId");
impl_uuid_newtype!(ActorId, "ActorId");

/// Fixed namespace for deterministic saga ids.
const SAGA_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x72, 0x67, 0x66, 0x6c, 0x6f, 0x77, 0x2d, 0x73, 0x61, 0x67, 0x61, 0x2d, 0x6e, 0x73,
    0x31,
]);

impl SagaId {
    /// Derive the saga id for a business key (e.g. an organization id).
    ///
    /// UUIDv5 over a fixed namespace: the same key always yields the same id,
    /// which is what makes `start_saga` idempotent.
    pub fn for_business_key(saga_type: &str, business_key: &str) -> Self {
        let name = format!("{saga_type}:{business_key}");
        Self(Uuid::new_v5(&SAGA_NAMESPACE, name.as_bytes()))
    }

    /// The stream a saga instance persists its progress on.
    pub fn stream_id(&self) -> StreamId {
        StreamId(self.0)
    }
}
