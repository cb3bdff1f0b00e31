//! Notification provider: templated messages to team members.

use std::sync::Mutex;

use tracing::info;

use orgflow_core::ActorId;

use super::ProviderError;

/// A templated message addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: ActorId,
    pub template: String,
    pub subject: String,
    pub body: String,
}

pub trait NotificationProvider: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), ProviderError>;
}

/// Log-only no-op: every send succeeds.
#[derive(Debug, Default)]
pub struct LoggingNotificationProvider;

impl NotificationProvider for LoggingNotificationProvider {
    fn send(&self, notification: &Notification) -> Result<(), ProviderError> {
        info!(
            recipient = %notification.recipient,
            template = %notification.template,
            "notification: send"
        );
        Ok(())
    }
}

/// In-memory fake that records sends and can fail selected recipients,
/// which is how tests exercise partial fan-out failure.
#[derive(Debug, Default)]
pub struct InMemoryNotificationProvider {
    inner: Mutex<NotificationState>,
}

#[derive(Debug, Default)]
struct NotificationState {
    sent: Vec<Notification>,
    failing: Vec<ActorId>,
}

impl InMemoryNotificationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to this recipient fail transiently.
    pub fn failing_for(self, recipient: ActorId) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.failing.push(recipient);
        }
        self
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.inner.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }
}

impl NotificationProvider for InMemoryNotificationProvider {
    fn send(&self, notification: &Notification) -> Result<(), ProviderError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| ProviderError::permanent("notification state poisoned"))?;
        if state.failing.contains(&notification.recipient) {
            return Err(ProviderError::transient(format!(
                "delivery to {} failed",
                notification.recipient
            )));
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}
