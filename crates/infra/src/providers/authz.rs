//! Authorization-context provider.
//!
//! The context (org scope, role, permission set) is derived externally and
//! treated as opaque here: orchestration threads it through to activities
//! without interpreting it.

use serde_json::Value as JsonValue;

use orgflow_core::{ActorId, StreamId};

use super::ProviderError;

/// Opaque authorization scope attached to saga input and activity calls.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuthorizationContext {
    pub actor: ActorId,
    pub organization_id: Option<StreamId>,
    /// Provider-defined claims; never inspected by the orchestrator.
    pub claims: JsonValue,
}

impl AuthorizationContext {
    pub fn for_actor(actor: ActorId) -> Self {
        Self {
            actor,
            organization_id: None,
            claims: JsonValue::Null,
        }
    }

    pub fn scoped_to(mut self, organization_id: StreamId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }
}

/// Derives the authorization context for an actor.
pub trait AuthorizationProvider: Send + Sync {
    fn derive(
        &self,
        actor: ActorId,
        organization_id: Option<StreamId>,
    ) -> Result<AuthorizationContext, ProviderError>;
}

/// Pass-through implementation: context carries the actor and scope with no
/// external claims.
#[derive(Debug, Default)]
pub struct StaticAuthorizationProvider;

impl AuthorizationProvider for StaticAuthorizationProvider {
    fn derive(
        &self,
        actor: ActorId,
        organization_id: Option<StreamId>,
    ) -> Result<AuthorizationContext, ProviderError> {
        let mut ctx = AuthorizationContext::for_actor(actor);
        if let Some(org) = organization_id {
            ctx = ctx.scoped_to(org);
        }
        Ok(ctx)
    }
}
