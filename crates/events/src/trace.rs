//! Correlation and trace context propagated through events and activities.
//!
//! Identifiers follow the W3C trace-context shape: `trace_id` is 32 lowercase
//! hex characters, span ids are 16. `correlation_id` is coarser: it groups one
//! logical business request across streams.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a completed span.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// Trace context carried by every event and every saga-initiated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    correlation_id: Uuid,
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
}

fn new_trace_id() -> String {
    // UUID simple form is exactly 32 lowercase hex chars.
    Uuid::now_v7().simple().to_string()
}

fn new_span_id() -> String {
    // The tail half of a v7 UUID is the random bits; the head is the
    // timestamp, which collides within a millisecond.
    Uuid::now_v7().simple().to_string()[16..].to_string()
}

impl TraceContext {
    /// Start a new root context for one logical business request.
    pub fn root() -> Self {
        Self {
            correlation_id: Uuid::now_v7(),
            trace_id: new_trace_id(),
            span_id: new_span_id(),
            parent_span_id: None,
        }
    }

    /// Derive a child context: same correlation and trace, new span whose
    /// parent is the current span.
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id,
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }

    /// Rebuild a context from propagated identifiers (e.g. event metadata).
    pub fn from_parts(
        correlation_id: Uuid,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
        }
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    /// Start timing a unit of work within this context.
    pub fn start_span(&self, name: &'static str) -> SpanTimer {
        SpanTimer {
            name,
            context: self.child(),
            started: Instant::now(),
        }
    }
}

/// Times a span and records its completion (duration + status) on drop-site.
///
/// Completion is recorded through `tracing`, which is how timelines are
/// reconstructed across asynchronous boundaries.
#[derive(Debug)]
pub struct SpanTimer {
    name: &'static str,
    context: TraceContext,
    started: Instant,
}

impl SpanTimer {
    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record span completion with the given status.
    pub fn finish(self, status: SpanStatus) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        match status {
            SpanStatus::Ok => tracing::info!(
                span_name = self.name,
                trace_id = %self.context.trace_id,
                span_id = %self.context.span_id,
                parent_span_id = ?self.context.parent_span_id,
                duration_ms,
                status = "ok",
                "span completed"
            ),
            SpanStatus::Error => tracing::warn!(
                span_name = self.name,
                trace_id = %self.context.trace_id,
                span_id = %self.context.span_id,
                parent_span_id = ?self.context.parent_span_id,
                duration_ms,
                status = "error",
                "span completed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_lower_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn root_context_has_w3c_shaped_identifiers() {
        let ctx = TraceContext::root();
        assert_eq!(ctx.trace_id().len(), 32);
        assert_eq!(ctx.span_id().len(), 16);
        assert!(is_lower_hex(ctx.trace_id()));
        assert!(is_lower_hex(ctx.span_id()));
        assert!(ctx.parent_span_id().is_none());
    }

    #[test]
    fn child_shares_trace_and_links_parent_span() {
        let root = TraceContext::root();
        let child = root.child();

        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.correlation_id(), root.correlation_id());
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(child.parent_span_id(), Some(root.span_id()));
    }

    #[test]
    fn span_ids_are_unique_within_a_millisecond() {
        let root = TraceContext::root();
        let ids: std::collections::HashSet<String> = (0..64)
            .map(|_| root.child().span_id().to_string())
            .collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn span_timer_derives_a_child_context() {
        let root = TraceContext::root();
        let timer = root.start_span("verify_dns");
        assert_eq!(timer.context().parent_span_id(), Some(root.span_id()));
        timer.finish(SpanStatus::Ok);
    }
}
