//! Organization read models: one row per organization plus a membership
//! junction keyed by `(organization_id, member)`.
//!
//! `member_count` is a derived aggregate and is always recomputed by a full
//! recount over the junction rows, never incremented or decremented, so a
//! replayed event can never skew it.

use serde::{Deserialize, Serialize};

use orgflow_core::{ActorId, EventId, StreamId};
use orgflow_events::{DomainEvent, NewEvent};
use orgflow_orgs::catalog::STREAM_ORGANIZATION;
use orgflow_orgs::{MemberRole, OrganizationEvent, OrganizationStatus};

use crate::read_model::ProjectionStore;
use crate::router::{EventProcessor, ProcessError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationReadModel {
    pub organization_id: StreamId,
    pub name: String,
    pub slug: String,
    pub status: OrganizationStatus,
    pub owner: ActorId,
    /// Derived: number of active membership rows. Recounted on every
    /// membership change.
    pub member_count: u64,
    pub last_event_id: EventId,
}

/// Junction row. Removal flips `active` instead of deleting the row, keeping
/// the read model aligned with the explicit-removal audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipReadModel {
    pub organization_id: StreamId,
    pub member: ActorId,
    pub role: MemberRole,
    pub active: bool,
    pub removal_reason: Option<String>,
    pub last_event_id: EventId,
}

pub struct OrganizationsProjection<O, M> {
    organizations: O,
    memberships: M,
}

impl<O, M> OrganizationsProjection<O, M>
where
    O: ProjectionStore<StreamId, OrganizationReadModel>,
    M: ProjectionStore<(StreamId, ActorId), MembershipReadModel>,
{
    pub fn new(organizations: O, memberships: M) -> Self {
        Self {
            organizations,
            memberships,
        }
    }

    pub fn get(&self, organization_id: StreamId) -> Option<OrganizationReadModel> {
        self.organizations.get(&organization_id)
    }

    pub fn list(&self) -> Vec<OrganizationReadModel> {
        let mut orgs = self.organizations.list();
        orgs.sort_by_key(|o| o.organization_id);
        orgs
    }

    pub fn members_of(&self, organization_id: StreamId) -> Vec<MembershipReadModel> {
        let mut rows: Vec<_> = self
            .memberships
            .list()
            .into_iter()
            .filter(|m| m.organization_id == organization_id && m.active)
            .collect();
        rows.sort_by_key(|m| m.member);
        rows
    }

    /// Full recount over active junction rows.
    fn recount_members(&self, organization_id: StreamId) -> u64 {
        self.memberships
            .list()
            .iter()
            .filter(|m| m.organization_id == organization_id && m.active)
            .count() as u64
    }

    fn update_org<F>(&self, organization_id: StreamId, event_id: EventId, apply: F)
    where
        F: FnOnce(&mut OrganizationReadModel),
    {
        if let Some(mut row) = self.organizations.get(&organization_id) {
            if row.last_event_id == event_id {
                return;
            }
            apply(&mut row);
            row.member_count = self.recount_members(organization_id);
            row.last_event_id = event_id;
            self.organizations.upsert(organization_id, row);
        }
    }

    /// Rebuild from scratch: projections are disposable derived state.
    pub fn rebuild<I: IntoIterator<Item = DomainEvent>>(
        &self,
        events: I,
    ) -> Result<(), ProcessError> {
        self.organizations.clear();
        self.memberships.clear();
        let mut ordered: Vec<_> = events
            .into_iter()
            .filter(|e| e.stream_type == STREAM_ORGANIZATION)
            .collect();
        ordered.sort_by_key(|e| (e.stream_id, e.stream_version));
        for event in &ordered {
            self.process(event)?;
        }
        Ok(())
    }
}

impl<O, M> EventProcessor for OrganizationsProjection<O, M>
where
    O: ProjectionStore<StreamId, OrganizationReadModel>,
    M: ProjectionStore<(StreamId, ActorId), MembershipReadModel>,
{
    fn stream_type(&self) -> &'static str {
        STREAM_ORGANIZATION
    }

    fn known_event_types(&self) -> &'static [&'static str] {
        OrganizationEvent::EVENT_TYPES
    }

    fn process(&self, event: &DomainEvent) -> Result<Vec<NewEvent>, ProcessError> {
        if !OrganizationEvent::EVENT_TYPES.contains(&event.event_type.as_str()) {
            return Err(ProcessError::UnknownEventType {
                stream_type: event.stream_type.clone(),
                event_type: event.event_type.clone(),
            });
        }
        let decoded = OrganizationEvent::decode(&event.event_type, &event.data)
            .map_err(|e| ProcessError::Deserialize(e.to_string()))?;

        match decoded {
            OrganizationEvent::Created(created) => {
                if let Some(existing) = self.organizations.get(&created.organization_id) {
                    if existing.last_event_id == event.id {
                        return Ok(vec![]);
                    }
                }
                self.organizations.upsert(
                    created.organization_id,
                    OrganizationReadModel {
                        organization_id: created.organization_id,
                        name: created.name,
                        slug: created.slug,
                        status: OrganizationStatus::Provisioning,
                        owner: created.owner,
                        member_count: self.recount_members(created.organization_id),
                        last_event_id: event.id,
                    },
                );
            }
            OrganizationEvent::Activated(activated) => {
                self.update_org(activated.organization_id, event.id, |row| {
                    row.status = OrganizationStatus::Active;
                });
            }
            OrganizationEvent::Deactivated(deactivated) => {
                self.update_org(deactivated.organization_id, event.id, |row| {
                    row.status = OrganizationStatus::Deactivated;
                });
            }
            OrganizationEvent::MemberAdded(added) => {
                let key = (added.organization_id, added.member);
                if let Some(existing) = self.memberships.get(&key) {
                    if existing.last_event_id == event.id {
                        return Ok(vec![]);
                    }
                }
                self.memberships.upsert(
                    key,
                    MembershipReadModel {
                        organization_id: added.organization_id,
                        member: added.member,
                        role: added.role,
                        active: true,
                        removal_reason: None,
                        last_event_id: event.id,
                    },
                );
                self.update_org(added.organization_id, event.id, |_| {});
            }
            OrganizationEvent::MemberRemoved(removed) => {
                let key = (removed.organization_id, removed.member);
                if let Some(mut row) = self.memberships.get(&key) {
                    if row.last_event_id == event.id {
                        return Ok(vec![]);
                    }
                    row.active = false;
                    row.removal_reason = removed.reason;
                    row.last_event_id = event.id;
                    self.memberships.upsert(key, row);
                }
                self.update_org(removed.organization_id, event.id, |_| {});
            }
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_model::InMemoryProjectionStore;
    use chrono::Utc;
    use orgflow_events::{EventMetadata, TraceContext};
    use orgflow_orgs::catalog::{
        ORGANIZATION_ACTIVATED, ORGANIZATION_CREATED, ORGANIZATION_MEMBER_ADDED,
        ORGANIZATION_MEMBER_REMOVED,
    };
    use orgflow_orgs::{MemberAdded, MemberRemoved, OrganizationActivated, OrganizationCreated};

    type Projection = OrganizationsProjection<
        InMemoryProjectionStore<StreamId, OrganizationReadModel>,
        InMemoryProjectionStore<(StreamId, ActorId), MembershipReadModel>,
    >;

    fn projection() -> Projection {
        OrganizationsProjection::new(InMemoryProjectionStore::new(), InMemoryProjectionStore::new())
    }

    fn org_event(
        organization_id: StreamId,
        version: u64,
        event_type: &str,
        data: serde_json::Value,
    ) -> DomainEvent {
        DomainEvent {
            id: EventId::new(),
            stream_id: organization_id,
            stream_type: STREAM_ORGANIZATION.to_string(),
            stream_version: version,
            event_type: event_type.to_string(),
            data,
            metadata: EventMetadata::from_trace(&TraceContext::root()),
            created_at: Utc::now(),
            processing_error: None,
            processed_at: None,
        }
    }

    fn created(organization_id: StreamId, owner: ActorId) -> DomainEvent {
        let payload = OrganizationCreated {
            organization_id,
            name: "Lakeside Clinic".into(),
            slug: "lakeside".into(),
            owner,
        };
        org_event(
            organization_id,
            1,
            ORGANIZATION_CREATED,
            serde_json::to_value(&payload).unwrap(),
        )
    }

    #[test]
    fn created_org_starts_provisioning() {
        let p = projection();
        let org = StreamId::new();
        p.process(&created(org, ActorId::new())).unwrap();

        let row = p.get(org).unwrap();
        assert_eq!(row.status, OrganizationStatus::Provisioning);
        assert_eq!(row.member_count, 0);
        assert_eq!(row.slug, "lakeside");
        assert_eq!(p.list().len(), 1);
    }

    #[test]
    fn member_count_is_recounted_not_incremented() {
        let p = projection();
        let org = StreamId::new();
        let owner = ActorId::new();
        p.process(&created(org, owner)).unwrap();

        let add = MemberAdded {
            organization_id: org,
            member: owner,
            role: MemberRole::Owner,
        };
        let add_event = org_event(
            org,
            2,
            ORGANIZATION_MEMBER_ADDED,
            serde_json::to_value(&add).unwrap(),
        );
        p.process(&add_event).unwrap();
        assert_eq!(p.get(org).unwrap().member_count, 1);

        // Redelivery of the same addition must not inflate the count.
        p.process(&add_event).unwrap();
        assert_eq!(p.get(org).unwrap().member_count, 1);

        let remove = MemberRemoved {
            organization_id: org,
            member: owner,
            reason: Some("offboarded".into()),
        };
        p.process(&org_event(
            org,
            3,
            ORGANIZATION_MEMBER_REMOVED,
            serde_json::to_value(&remove).unwrap(),
        ))
        .unwrap();

        let row = p.get(org).unwrap();
        assert_eq!(row.member_count, 0);
        assert!(p.members_of(org).is_empty());
    }

    #[test]
    fn activation_flips_status() {
        let p = projection();
        let org = StreamId::new();
        p.process(&created(org, ActorId::new())).unwrap();

        let payload = OrganizationActivated {
            organization_id: org,
            activated_at: Utc::now(),
        };
        p.process(&org_event(
            org,
            2,
            ORGANIZATION_ACTIVATED,
            serde_json::to_value(&payload).unwrap(),
        ))
        .unwrap();

        assert_eq!(p.get(org).unwrap().status, OrganizationStatus::Active);
    }

    #[test]
    fn removal_keeps_junction_row_inactive() {
        let p = projection();
        let org = StreamId::new();
        let member = ActorId::new();
        p.process(&created(org, member)).unwrap();

        let add = MemberAdded {
            organization_id: org,
            member,
            role: MemberRole::Admin,
        };
        p.process(&org_event(
            org,
            2,
            ORGANIZATION_MEMBER_ADDED,
            serde_json::to_value(&add).unwrap(),
        ))
        .unwrap();
        let remove = MemberRemoved {
            organization_id: org,
            member,
            reason: None,
        };
        p.process(&org_event(
            org,
            3,
            ORGANIZATION_MEMBER_REMOVED,
            serde_json::to_value(&remove).unwrap(),
        ))
        .unwrap();

        // Row survives for audit, but is excluded from active listings.
        assert!(p.members_of(org).is_empty());
    }

    #[test]
    fn rebuild_replays_in_stream_order() {
        let p = projection();
        let org = StreamId::new();
        let owner = ActorId::new();
        let e1 = created(org, owner);
        let add = MemberAdded {
            organization_id: org,
            member: owner,
            role: MemberRole::Owner,
        };
        let e2 = org_event(
            org,
            2,
            ORGANIZATION_MEMBER_ADDED,
            serde_json::to_value(&add).unwrap(),
        );

        // Deliberately shuffled input; rebuild sorts by stream version.
        p.rebuild(vec![e2, e1]).unwrap();
        let row = p.get(org).unwrap();
        assert_eq!(row.member_count, 1);
    }
}
