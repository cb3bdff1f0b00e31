//! Partnership read model and the revocation cascade.
//!
//! Invariant: no active access grant may reference a non-active partnership.
//! When a partnership expires or is terminated, this processor enumerates the
//! grants it authorizes and emits `access_grant.revoked` cascade events for
//! the still-active ones. Cascade event ids are derived deterministically
//! from the causing event and the grant, so redelivery of the partnership
//! event re-derives the same ids and the router deduplicates against the
//! ledger instead of revoking twice.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orgflow_core::{EventId, StreamId};
use orgflow_events::{DomainEvent, EventMetadata, NewEvent, TraceContext};
use orgflow_orgs::catalog::{STREAM_ACCESS_GRANT, STREAM_PARTNERSHIP};
use orgflow_orgs::{AccessGrantEvent, AccessGrantRevoked, PartnershipEvent, PartnershipStatus};

use crate::projections::access_grants::{AccessGrantReadModel, AccessGrantsProjection};
use crate::read_model::ProjectionStore;
use crate::router::{EventProcessor, ProcessError};

/// Namespace for deterministic cascade event ids.
const CASCADE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x72, 0x67, 0x66, 0x6c, 0x6f, 0x77, 0x2d, 0x63, 0x61, 0x73, 0x63, 0x2d, 0x6e, 0x73,
    0x31,
]);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnershipReadModel {
    pub partnership_id: StreamId,
    pub organization_id: StreamId,
    pub partner_organization_id: StreamId,
    pub status: PartnershipStatus,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_reason: Option<String>,
    pub last_event_id: EventId,
}

pub struct PartnershipsProjection<P, G> {
    partnerships: P,
    /// Grant rows are read here to enumerate the cascade targets; they are
    /// owned and written by [`AccessGrantsProjection`].
    grants: AccessGrantsProjection<G>,
}

impl<P, G> PartnershipsProjection<P, G>
where
    P: ProjectionStore<StreamId, PartnershipReadModel>,
    G: ProjectionStore<StreamId, AccessGrantReadModel>,
{
    pub fn new(partnerships: P, grants: AccessGrantsProjection<G>) -> Self {
        Self {
            partnerships,
            grants,
        }
    }

    pub fn get(&self, partnership_id: StreamId) -> Option<PartnershipReadModel> {
        self.partnerships.get(&partnership_id)
    }

    pub fn list(&self) -> Vec<PartnershipReadModel> {
        let mut rows = self.partnerships.list();
        rows.sort_by_key(|p| p.partnership_id);
        rows
    }

    /// Rebuild from scratch: projections are disposable derived state.
    /// Cascade requests produced during replay are discarded; the revocation
    /// events they once produced are part of the history being replayed.
    pub fn rebuild<I: IntoIterator<Item = DomainEvent>>(
        &self,
        events: I,
    ) -> Result<(), ProcessError> {
        self.partnerships.clear();
        let mut ordered: Vec<_> = events
            .into_iter()
            .filter(|e| e.stream_type == STREAM_PARTNERSHIP)
            .collect();
        ordered.sort_by_key(|e| (e.stream_id, e.stream_version));
        for event in &ordered {
            self.process(event)?;
        }
        Ok(())
    }

    /// Build the revocation cascade for a partnership that stopped being
    /// active. Already-revoked grants are skipped.
    fn revocation_cascade(
        &self,
        partnership_id: StreamId,
        reason: &str,
        cause: &DomainEvent,
    ) -> Vec<NewEvent> {
        self.grants
            .active_for_partnership(partnership_id)
            .into_iter()
            .map(|grant| {
                let revoked = AccessGrantEvent::Revoked(AccessGrantRevoked {
                    grant_id: grant.grant_id,
                    reason: reason.to_string(),
                });
                let trace = TraceContext::from_parts(
                    cause.metadata.correlation_id,
                    cause.metadata.trace_id.clone(),
                    cause.metadata.span_id.clone(),
                )
                .child();
                let id = EventId::from_uuid(Uuid::new_v5(
                    &CASCADE_NAMESPACE,
                    format!("revoke:{}:cause:{}", grant.grant_id, cause.id).as_bytes(),
                ));
                NewEvent::new(
                    grant.grant_id,
                    STREAM_ACCESS_GRANT,
                    revoked.event_type(),
                    revoked.encode(),
                    EventMetadata::from_trace(&trace).caused_by(cause.id),
                )
                .with_id(id)
            })
            .collect()
    }
}

impl<P, G> EventProcessor for PartnershipsProjection<P, G>
where
    P: ProjectionStore<StreamId, PartnershipReadModel>,
    G: ProjectionStore<StreamId, AccessGrantReadModel>,
{
    fn stream_type(&self) -> &'static str {
        STREAM_PARTNERSHIP
    }

    fn known_event_types(&self) -> &'static [&'static str] {
        PartnershipEvent::EVENT_TYPES
    }

    fn process(&self, event: &DomainEvent) -> Result<Vec<NewEvent>, ProcessError> {
        if !PartnershipEvent::EVENT_TYPES.contains(&event.event_type.as_str()) {
            return Err(ProcessError::UnknownEventType {
                stream_type: event.stream_type.clone(),
                event_type: event.event_type.clone(),
            });
        }
        let decoded = PartnershipEvent::decode(&event.event_type, &event.data)
            .map_err(|e| ProcessError::Deserialize(e.to_string()))?;

        match decoded {
            PartnershipEvent::Established(established) => {
                if let Some(existing) = self.partnerships.get(&established.partnership_id) {
                    if existing.last_event_id == event.id {
                        return Ok(vec![]);
                    }
                }
                self.partnerships.upsert(
                    established.partnership_id,
                    PartnershipReadModel {
                        partnership_id: established.partnership_id,
                        organization_id: established.organization_id,
                        partner_organization_id: established.partner_organization_id,
                        status: PartnershipStatus::Active,
                        expires_at: established.expires_at,
                        end_reason: None,
                        last_event_id: event.id,
                    },
                );
                Ok(vec![])
            }
            PartnershipEvent::Expired(expired) => {
                if let Some(mut row) = self.partnerships.get(&expired.partnership_id) {
                    // Redelivery skips only the row write, never the cascade.
                    if row.last_event_id != event.id {
                        row.status = PartnershipStatus::Expired;
                        row.last_event_id = event.id;
                        self.partnerships.upsert(expired.partnership_id, row);
                    }
                }
                // Cascade is enumerated even when the row was already
                // non-active: a half-applied previous delivery may have left
                // active grants behind, and stable ids deduplicate the rest.
                Ok(self.revocation_cascade(
                    expired.partnership_id,
                    "partnership expired",
                    event,
                ))
            }
            PartnershipEvent::Terminated(terminated) => {
                if let Some(mut row) = self.partnerships.get(&terminated.partnership_id) {
                    if row.last_event_id != event.id {
                        row.status = PartnershipStatus::Terminated;
                        row.end_reason = Some(terminated.reason.clone());
                        row.last_event_id = event.id;
                        self.partnerships.upsert(terminated.partnership_id, row);
                    }
                }
                Ok(self.revocation_cascade(
                    terminated.partnership_id,
                    &format!("partnership terminated: {}", terminated.reason),
                    event,
                ))
            }
        }
    }
}
