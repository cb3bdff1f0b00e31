//! Operator surface for poison events.
//!
//! Poison events never block their stream; they accumulate with a recorded
//! `processing_error` until an operator retries them (after fixing the cause)
//! or dismisses them with an audited reason.

use tracing::info;

use orgflow_core::EventId;
use orgflow_events::DomainEvent;

use crate::event_store::EventStore;
use crate::router::{DispatchOutcome, EventRouter, RouterError};

pub struct EventAdmin<'r, S> {
    router: &'r EventRouter<S>,
}

impl<'r, S: EventStore> EventAdmin<'r, S> {
    pub fn new(router: &'r EventRouter<S>) -> Self {
        Self { router }
    }

    /// Events with a recorded processing error, oldest first.
    pub fn failed_events(&self) -> Result<Vec<DomainEvent>, RouterError> {
        Ok(self.router.store().list_failed()?)
    }

    /// Clear the recorded error and dispatch the event again. Used after the
    /// underlying cause (bad payload handling, missing processor) is fixed.
    pub fn retry(&self, event_id: EventId) -> Result<DispatchOutcome, RouterError> {
        self.router.store().clear_error(event_id)?;
        let event = self.router.store().get(event_id)?;
        info!(event_id = %event_id, event_type = %event.event_type, "retrying poison event");
        self.router.dispatch(&event)
    }

    /// Give up on the event: record the reason and mark it processed so it
    /// stops surfacing in the failed list. The audit trail keeps both the
    /// original error and the dismissal reason.
    pub fn dismiss(&self, event_id: EventId, reason: &str) -> Result<(), RouterError> {
        info!(event_id = %event_id, reason, "dismissing poison event");
        Ok(self.router.store().dismiss(event_id, reason)?)
    }
}
