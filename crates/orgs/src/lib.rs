//! `orgflow-orgs` — organizational domain module (event-sourced).
//!
//! This crate contains the typed events for the organizational streams
//! (organization lifecycle and membership, partnerships, access grants) and
//! the event catalog the router validates against. Deterministic domain data
//! only: no IO, no storage, no orchestration.

pub mod access_grant;
pub mod catalog;
pub mod organization;
pub mod partnership;

pub use access_grant::{
    AccessGrantEvent, AccessGrantIssued, AccessGrantRevoked, GrantScope, GrantStatus,
};
pub use organization::{
    MemberAdded, MemberRemoved, MemberRole, OrganizationActivated, OrganizationCreated,
    OrganizationDeactivated, OrganizationEvent, OrganizationStatus,
};
pub use partnership::{
    PartnershipEstablished, PartnershipEvent, PartnershipExpired, PartnershipStatus,
    PartnershipTerminated,
};
