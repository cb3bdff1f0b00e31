//! The known event catalog: every `(stream_type, event_type)` pair producers
//! are allowed to emit.
//!
//! The router validates its processor registry against this catalog at
//! startup, so a newly added event type without a handler is caught before
//! any event is dispatched rather than surfacing as a poison event later.

/// Stream holding an organization's lifecycle and membership history.
pub const STREAM_ORGANIZATION: &str = "organization";
/// Stream holding one partnership's history.
pub const STREAM_PARTNERSHIP: &str = "partnership";
/// Stream holding one access grant's history.
pub const STREAM_ACCESS_GRANT: &str = "access_grant";
/// Stream a provisioning saga instance persists its progress on.
pub const STREAM_SAGA_PROVISIONING: &str = "saga.provisioning";

pub const ORGANIZATION_CREATED: &str = "organization.created";
pub const ORGANIZATION_ACTIVATED: &str = "organization.activated";
pub const ORGANIZATION_DEACTIVATED: &str = "organization.deactivated";
pub const ORGANIZATION_MEMBER_ADDED: &str = "organization.member_added";
pub const ORGANIZATION_MEMBER_REMOVED: &str = "organization.member_removed";

pub const PARTNERSHIP_ESTABLISHED: &str = "partnership.established";
pub const PARTNERSHIP_EXPIRED: &str = "partnership.expired";
pub const PARTNERSHIP_TERMINATED: &str = "partnership.terminated";

pub const ACCESS_GRANT_ISSUED: &str = "access_grant.issued";
pub const ACCESS_GRANT_REVOKED: &str = "access_grant.revoked";

/// Every routable `(stream_type, event_type)` pair.
///
/// Saga streams are not listed: they are orchestration bookkeeping, consumed
/// by the orchestrator itself rather than by projections.
pub const EVENT_CATALOG: &[(&str, &str)] = &[
    (STREAM_ORGANIZATION, ORGANIZATION_CREATED),
    (STREAM_ORGANIZATION, ORGANIZATION_ACTIVATED),
    (STREAM_ORGANIZATION, ORGANIZATION_DEACTIVATED),
    (STREAM_ORGANIZATION, ORGANIZATION_MEMBER_ADDED),
    (STREAM_ORGANIZATION, ORGANIZATION_MEMBER_REMOVED),
    (STREAM_PARTNERSHIP, PARTNERSHIP_ESTABLISHED),
    (STREAM_PARTNERSHIP, PARTNERSHIP_EXPIRED),
    (STREAM_PARTNERSHIP, PARTNERSHIP_TERMINATED),
    (STREAM_ACCESS_GRANT, ACCESS_GRANT_ISSUED),
    (STREAM_ACCESS_GRANT, ACCESS_GRANT_REVOKED),
];
