//! Background workers (thread-based, gracefully stoppable).

pub mod router_worker;

pub use router_worker::{RouterWorker, WorkerHandle};
