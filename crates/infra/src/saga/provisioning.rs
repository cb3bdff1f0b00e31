//! The organization provisioning saga.
//!
//! Forward path: record the organization, create and verify its DNS record,
//! grant the owner access, notify the team, then activate. DNS verification
//! waits on external propagation and uses the verification retry schedule.
//! Compensation path (reverse, best-effort): remove the owner grant, delete
//! the DNS record, deactivate the organization.
//!
//! Activities are idempotent by construction: ledger appends use stable event
//! ids derived from the saga id and step name, so a re-executed activity
//! detects its previous append instead of applying twice. Provider calls
//! (DNS create/delete) are idempotent at the provider boundary.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use orgflow_core::{ActorId, EventId, ExpectedVersion, SagaId, StreamId};
use orgflow_events::{ActivityError, EventMetadata, NewEvent, RetryPolicy, SagaWarning};
use orgflow_orgs::catalog::{STREAM_ORGANIZATION, STREAM_SAGA_PROVISIONING};
use orgflow_orgs::{
    MemberAdded, MemberRemoved, MemberRole, OrganizationActivated, OrganizationCreated,
    OrganizationDeactivated, OrganizationEvent,
};

use crate::event_store::{EventStore, EventStoreError};
use crate::providers::{AuthorizationContext, DnsProvider, Notification, NotificationProvider};

use super::{SagaDefinition, SagaStep, StepContext, StepOutcome};

pub const PROVISIONING_SAGA_TYPE: &str = "organization_provisioning";

pub const STEP_CREATE_ORGANIZATION: &str = "create_organization";
pub const STEP_PROVISION_DNS: &str = "provision_dns";
pub const STEP_VERIFY_DNS: &str = "verify_dns";
pub const STEP_GRANT_OWNER_ACCESS: &str = "grant_owner_access";
pub const STEP_NOTIFY_TEAM: &str = "notify_team";
pub const STEP_ACTIVATE_ORGANIZATION: &str = "activate_organization";

/// Namespace for stable activity-emitted event ids.
const ACTIVITY_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x72, 0x67, 0x66, 0x6c, 0x6f, 0x77, 0x2d, 0x61, 0x63, 0x74, 0x76, 0x2d, 0x6e, 0x73,
    0x31,
]);

/// Input of one provisioning run; serialized into `saga.initiated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningInput {
    pub organization_id: StreamId,
    pub name: String,
    pub slug: String,
    pub owner: ActorId,
    /// Team members to notify once the organization is live.
    pub notify: Vec<ActorId>,
    /// Opaque scope derived by the authorization provider; threaded through,
    /// never interpreted.
    pub authorization: AuthorizationContext,
}

fn decode_input(ctx: &StepContext) -> Result<ProvisioningInput, ActivityError> {
    serde_json::from_value(ctx.input.clone())
        .map_err(|e| ActivityError::fatal(format!("invalid provisioning input: {e}")))
}

fn stable_event_id(saga_id: SagaId, step: &str) -> EventId {
    EventId::from_uuid(Uuid::new_v5(
        &ACTIVITY_NAMESPACE,
        format!("{saga_id}:{step}").as_bytes(),
    ))
}

/// Append an activity-emitted event, tolerating re-execution: a duplicate
/// stable id or a `NoStream` conflict means a previous attempt already
/// appended it, which is success.
fn append_once<S: EventStore>(
    store: &S,
    event: NewEvent,
    expected: ExpectedVersion,
) -> Result<(), ActivityError> {
    match store.append(event, expected) {
        Ok(_) => Ok(()),
        Err(EventStoreError::Concurrency(_)) => Ok(()),
        Err(EventStoreError::InvalidAppend(msg)) if msg.contains("duplicate event id") => Ok(()),
        Err(err) if err.is_retryable() => Err(ActivityError::transient(err.to_string())),
        Err(err) => Err(ActivityError::fatal(err.to_string())),
    }
}

fn activity_metadata(ctx: &StepContext, actor: ActorId) -> EventMetadata {
    EventMetadata::from_trace(&ctx.trace.child()).with_actor(actor)
}

fn organization_event(
    organization_id: StreamId,
    event: &OrganizationEvent,
    metadata: EventMetadata,
) -> NewEvent {
    NewEvent::new(
        organization_id,
        STREAM_ORGANIZATION,
        event.event_type(),
        event.encode(),
        metadata,
    )
}

/// Build the provisioning saga over the given store and providers.
pub fn provisioning_saga<S>(
    store: S,
    dns: Arc<dyn DnsProvider>,
    notifications: Arc<dyn NotificationProvider>,
) -> SagaDefinition
where
    S: EventStore + Clone + 'static,
{
    let create_store = store.clone();
    let create = SagaStep::new(STEP_CREATE_ORGANIZATION, move |ctx| {
        let input = decode_input(ctx)?;
        let event = organization_event(
            input.organization_id,
            &OrganizationEvent::Created(OrganizationCreated {
                organization_id: input.organization_id,
                name: input.name.clone(),
                slug: input.slug.clone(),
                owner: input.owner,
            }),
            activity_metadata(ctx, input.owner),
        )
        .with_id(stable_event_id(ctx.saga_id, STEP_CREATE_ORGANIZATION));
        append_once(&create_store, event, ExpectedVersion::NoStream)?;
        Ok(StepOutcome::with_output(serde_json::json!({
            "organization_id": input.organization_id,
        })))
    });
    let undo_create_store = store.clone();
    let create = create.with_compensation(move |ctx| {
        let input = decode_input(ctx)?;
        let event = organization_event(
            input.organization_id,
            &OrganizationEvent::Deactivated(OrganizationDeactivated {
                organization_id: input.organization_id,
                reason: "provisioning rolled back".to_string(),
            }),
            activity_metadata(ctx, input.owner).with_reason("provisioning rolled back"),
        )
        .with_id(stable_event_id(ctx.saga_id, "undo_create_organization"));
        append_once(&undo_create_store, event, ExpectedVersion::Any)
    });

    let create_dns = Arc::clone(&dns);
    let provision = SagaStep::new(STEP_PROVISION_DNS, move |ctx| {
        let input = decode_input(ctx)?;
        create_dns.create_record(&input.slug).map_err(ActivityError::from)?;
        Ok(StepOutcome::with_output(serde_json::json!({ "slug": input.slug })))
    })
    .with_retry(RetryPolicy::exponential(
        4,
        Duration::from_secs(1),
        Duration::from_secs(30),
    ))
    .with_timeout(Duration::from_secs(30));
    let delete_dns = Arc::clone(&dns);
    let provision = provision.with_compensation(move |ctx| {
        let input = decode_input(ctx)?;
        // Tolerates "nothing to undo": deleting a missing record succeeds.
        delete_dns.delete_record(&input.slug).map_err(ActivityError::from)?;
        Ok(())
    });

    let verify_dns = Arc::clone(&dns);
    let verify = SagaStep::new(STEP_VERIFY_DNS, move |ctx| {
        let input = decode_input(ctx)?;
        match verify_dns.verify_record(&input.slug) {
            Ok(true) => Ok(StepOutcome::empty()),
            Ok(false) => Err(ActivityError::transient(format!(
                "dns record for '{}' not yet propagated",
                input.slug
            ))),
            Err(err) => Err(err.into()),
        }
    })
    .with_retry(RetryPolicy::verification())
    .with_timeout(Duration::from_secs(60));

    let grant_store = store.clone();
    let grant = SagaStep::new(STEP_GRANT_OWNER_ACCESS, move |ctx| {
        let input = decode_input(ctx)?;
        let event = organization_event(
            input.organization_id,
            &OrganizationEvent::MemberAdded(MemberAdded {
                organization_id: input.organization_id,
                member: input.owner,
                role: MemberRole::Owner,
            }),
            activity_metadata(ctx, input.owner),
        )
        .with_id(stable_event_id(ctx.saga_id, STEP_GRANT_OWNER_ACCESS));
        append_once(&grant_store, event, ExpectedVersion::Any)?;
        Ok(StepOutcome::empty())
    });
    let ungrant_store = store.clone();
    let grant = grant.with_compensation(move |ctx| {
        let input = decode_input(ctx)?;
        let event = organization_event(
            input.organization_id,
            &OrganizationEvent::MemberRemoved(MemberRemoved {
                organization_id: input.organization_id,
                member: input.owner,
                reason: Some("provisioning rolled back".to_string()),
            }),
            activity_metadata(ctx, input.owner).with_reason("provisioning rolled back"),
        )
        .with_id(stable_event_id(ctx.saga_id, "undo_grant_owner_access"));
        append_once(&ungrant_store, event, ExpectedVersion::Any)
    });

    let notify = SagaStep::new(STEP_NOTIFY_TEAM, move |ctx| {
        let input = decode_input(ctx)?;
        // Fan-out: one failed delivery degrades the step, never fails it.
        let mut warnings = Vec::new();
        let mut delivered = 0u32;
        for recipient in &input.notify {
            let notification = Notification {
                recipient: *recipient,
                template: "organization_provisioned".to_string(),
                subject: format!("{} is ready", input.name),
                body: format!("The organization '{}' has been provisioned.", input.name),
            };
            match notifications.send(&notification) {
                Ok(()) => delivered += 1,
                Err(err) => warnings.push(SagaWarning {
                    step: STEP_NOTIFY_TEAM.to_string(),
                    subject: recipient.to_string(),
                    error: err.to_string(),
                }),
            }
        }
        Ok(StepOutcome {
            output: serde_json::json!({ "delivered": delivered }),
            warnings,
        })
    });

    let activate_store = store.clone();
    let activate = SagaStep::new(STEP_ACTIVATE_ORGANIZATION, move |ctx| {
        let input = decode_input(ctx)?;
        let event = organization_event(
            input.organization_id,
            &OrganizationEvent::Activated(OrganizationActivated {
                organization_id: input.organization_id,
                activated_at: chrono::Utc::now(),
            }),
            activity_metadata(ctx, input.owner),
        )
        .with_id(stable_event_id(ctx.saga_id, STEP_ACTIVATE_ORGANIZATION));
        append_once(&activate_store, event, ExpectedVersion::Any)?;
        Ok(StepOutcome::empty())
    });

    SagaDefinition::new(PROVISIONING_SAGA_TYPE, STREAM_SAGA_PROVISIONING)
        .step(create)
        .step(provision)
        .step(verify)
        .step(grant)
        .step(notify)
        .step(activate)
}

/// The business key of a provisioning run is the organization id: starting
/// the saga twice for the same organization attaches to the same instance.
pub fn provisioning_business_key(organization_id: StreamId) -> String {
    organization_id.to_string()
}

/// Convenience: deterministic saga id for an organization.
pub fn provisioning_saga_id(organization_id: StreamId) -> SagaId {
    SagaId::for_business_key(
        PROVISIONING_SAGA_TYPE,
        &provisioning_business_key(organization_id),
    )
}

/// Helper for callers: start payload with a root trace.
pub fn provisioning_input(
    organization_id: StreamId,
    name: impl Into<String>,
    slug: impl Into<String>,
    owner: ActorId,
    notify: Vec<ActorId>,
    authorization: AuthorizationContext,
) -> ProvisioningInput {
    ProvisioningInput {
        organization_id,
        name: name.into(),
        slug: slug.into(),
        owner,
        notify,
        authorization,
    }
}
