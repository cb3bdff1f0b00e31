//! Projection processors: idempotent read models derived from the ledger.
//!
//! Every row carries the id of the last event applied to it; reapplying an
//! event is a no-op. Derived aggregates (like member counts) are recomputed
//! by full recount, never incremented. All projections can be rebuilt from
//! scratch by replaying their stream's history.

pub mod access_grants;
pub mod organizations;
pub mod partnerships;

pub use access_grants::{AccessGrantReadModel, AccessGrantsProjection};
pub use organizations::{MembershipReadModel, OrganizationReadModel, OrganizationsProjection};
pub use partnerships::{PartnershipReadModel, PartnershipsProjection};
