//! Process-wide observability setup.
//!
//! Events and saga steps already carry their own trace identifiers
//! (`trace_id`/`span_id` in event metadata); this crate only configures the
//! `tracing` backend those identifiers are logged through.

pub mod tracing;

pub use tracing::{LogConfig, LogFormat};

/// Initialize process-wide observability with defaults (JSON logs, filter
/// from `RUST_LOG`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&LogConfig::default());
}
