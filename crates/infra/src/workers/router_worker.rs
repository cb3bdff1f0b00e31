//! Worker thread that drains the event bus into the router.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use orgflow_events::{DomainEvent, EventBus, Subscription};

use crate::event_store::EventStore;
use crate::router::{EventRouter, RouterError};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Subscribes to the event bus and dispatches every delivered event through
/// the router. Delivery is at-least-once; the router's idempotence makes
/// redelivery harmless. On startup the worker first drains events appended
/// before it subscribed (crash recovery).
pub struct RouterWorker;

impl RouterWorker {
    pub fn spawn<S, B>(
        name: &'static str,
        bus: B,
        router: Arc<EventRouter<S>>,
    ) -> WorkerHandle
    where
        S: EventStore + 'static,
        B: EventBus<DomainEvent> + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<DomainEvent> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                match router.dispatch_unprocessed() {
                    Ok(0) => {}
                    Ok(n) => info!(worker = name, recovered = n, "dispatched backlog"),
                    Err(err) => error!(worker = name, error = %err, "backlog dispatch failed"),
                }
                worker_loop(name, sub, shutdown_rx, &router);
            })
            .expect("failed to spawn router worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

fn worker_loop<S: EventStore>(
    name: &'static str,
    sub: Subscription<DomainEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    router: &EventRouter<S>,
) {
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => match router.dispatch(&event) {
                Ok(_) => {}
                Err(RouterError::OutOfOrder { .. }) => {
                    // Delivery bug, not an event problem: surface loudly and
                    // leave the event unprocessed for the recovery scan.
                    error!(worker = name, event_id = %event.id, "out-of-order delivery");
                }
                Err(err) => {
                    warn!(worker = name, event_id = %event.id, error = %err, "dispatch failed");
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!(worker = name, "router worker stopped");
}
