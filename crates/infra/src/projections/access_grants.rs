//! Access grant read model: cross-organization grants authorized by a
//! partnership. Revocation is terminal; reapplying a revocation is a no-op.

use serde::{Deserialize, Serialize};

use orgflow_core::{ActorId, EventId, StreamId};
use orgflow_events::{DomainEvent, NewEvent};
use orgflow_orgs::catalog::STREAM_ACCESS_GRANT;
use orgflow_orgs::{AccessGrantEvent, GrantScope, GrantStatus};

use crate::read_model::ProjectionStore;
use crate::router::{EventProcessor, ProcessError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrantReadModel {
    pub grant_id: StreamId,
    pub partnership_id: StreamId,
    pub organization_id: StreamId,
    pub grantee: ActorId,
    pub scope: GrantScope,
    pub status: GrantStatus,
    pub revoke_reason: Option<String>,
    /// Id of the last event applied to this row; rows are idempotent upserts.
    pub last_event_id: EventId,
}

pub struct AccessGrantsProjection<S> {
    grants: S,
}

impl<S> AccessGrantsProjection<S>
where
    S: ProjectionStore<StreamId, AccessGrantReadModel>,
{
    pub fn new(grants: S) -> Self {
        Self { grants }
    }

    pub fn get(&self, grant_id: StreamId) -> Option<AccessGrantReadModel> {
        self.grants.get(&grant_id)
    }

    pub fn list(&self) -> Vec<AccessGrantReadModel> {
        self.grants.list()
    }

    /// Grants still active under the given partnership. This is the cascade
    /// enumeration query: partnership expiry revokes exactly these.
    pub fn active_for_partnership(&self, partnership_id: StreamId) -> Vec<AccessGrantReadModel> {
        let mut grants: Vec<_> = self
            .grants
            .list()
            .into_iter()
            .filter(|g| g.partnership_id == partnership_id && g.status == GrantStatus::Active)
            .collect();
        grants.sort_by_key(|g| g.grant_id);
        grants
    }

    /// Rebuild from scratch: projections are disposable derived state.
    pub fn rebuild<I: IntoIterator<Item = DomainEvent>>(
        &self,
        events: I,
    ) -> Result<(), ProcessError> {
        self.grants.clear();
        let mut ordered: Vec<_> = events
            .into_iter()
            .filter(|e| e.stream_type == STREAM_ACCESS_GRANT)
            .collect();
        ordered.sort_by_key(|e| (e.stream_id, e.stream_version));
        for event in &ordered {
            self.process(event)?;
        }
        Ok(())
    }
}

impl<S> EventProcessor for AccessGrantsProjection<S>
where
    S: ProjectionStore<StreamId, AccessGrantReadModel>,
{
    fn stream_type(&self) -> &'static str {
        STREAM_ACCESS_GRANT
    }

    fn known_event_types(&self) -> &'static [&'static str] {
        AccessGrantEvent::EVENT_TYPES
    }

    fn process(&self, event: &DomainEvent) -> Result<Vec<NewEvent>, ProcessError> {
        if !AccessGrantEvent::EVENT_TYPES.contains(&event.event_type.as_str()) {
            return Err(ProcessError::UnknownEventType {
                stream_type: event.stream_type.clone(),
                event_type: event.event_type.clone(),
            });
        }
        let decoded = AccessGrantEvent::decode(&event.event_type, &event.data)
            .map_err(|e| ProcessError::Deserialize(e.to_string()))?;

        match decoded {
            AccessGrantEvent::Issued(issued) => {
                if let Some(existing) = self.grants.get(&issued.grant_id) {
                    // Already applied, or re-issue racing a revocation: the
                    // existing row wins.
                    if existing.last_event_id == event.id
                        || existing.status == GrantStatus::Revoked
                    {
                        return Ok(vec![]);
                    }
                }
                self.grants.upsert(
                    issued.grant_id,
                    AccessGrantReadModel {
                        grant_id: issued.grant_id,
                        partnership_id: issued.partnership_id,
                        organization_id: issued.organization_id,
                        grantee: issued.grantee,
                        scope: issued.scope,
                        status: GrantStatus::Active,
                        revoke_reason: None,
                        last_event_id: event.id,
                    },
                );
            }
            AccessGrantEvent::Revoked(revoked) => {
                if let Some(mut row) = self.grants.get(&revoked.grant_id) {
                    if row.last_event_id == event.id || row.status == GrantStatus::Revoked {
                        return Ok(vec![]);
                    }
                    row.status = GrantStatus::Revoked;
                    row.revoke_reason = Some(revoked.reason);
                    row.last_event_id = event.id;
                    self.grants.upsert(revoked.grant_id, row);
                }
                // Revocation for an unknown grant: nothing to update, and the
                // ledger already carries the record.
            }
        }
        Ok(vec![])
    }
}
