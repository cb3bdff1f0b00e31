//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the transport between the ledger and its consumers (router,
//! workers). It is deliberately lightweight:
//!
//! - **Transport-agnostic**: in-memory channels here, brokers elsewhere.
//! - **At-least-once**: consumers must be idempotent; the ledger is the source
//!   of truth, so redelivery is always safe.
//! - **No persistence**: distribution only, never storage.
//! - **Per-stream ordering only**: cross-stream ordering is carried by
//!   correlation/causation ids, not by the bus.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to published events.
///
/// Each subscription receives a copy of every published message (broadcast
/// semantics). Intended for single-threaded consumption, typically inside a
/// worker loop with `recv_timeout` so shutdown can be observed.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Pub/sub abstraction for distributing persisted events.
///
/// Events are appended to the store first and published after; if publication
/// fails the event is still durable and can be republished, which is why
/// at-least-once is acceptable everywhere downstream.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
