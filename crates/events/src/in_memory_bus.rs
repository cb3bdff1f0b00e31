//! Process-local pub/sub used by tests and single-process wiring.

use std::sync::{Mutex, mpsc};

use thiserror::Error;
use tracing::debug;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("event bus subscriber registry is poisoned")]
    Poisoned,
}

/// Channel-backed bus: every subscriber owns an `mpsc` receiver and
/// `publish` fans a clone of the message out to each registered sender.
/// Senders whose receiver has been dropped are pruned on the next publish.
///
/// Delivery is at-least-once from the consumer's point of view, so
/// subscribers are expected to be idempotent.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let before = senders.len();
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        if senders.len() < before {
            debug!(
                pruned = before - senders.len(),
                "dropped closed bus subscriptions"
            );
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        // A poisoned registry still hands out a subscription; it simply
        // never receives anything.
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        Subscription::new(rx)
    }
}
