use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One structured event from a pipeline stage: a kind string plus a JSON
/// payload, stamped at creation.
#[derive(Debug, Clone)]
pub struct StageEvent {
    pub kind: &'static str,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(kind: &'static str, payload: serde_json::Value) -> Self {
        StageEvent {
            kind,
            payload,
            at: Utc::now(),
        }
    }
}

/// Where stage events go. Delivery is fire-and-forget: nothing in the core
/// depends on a sink accepting or persisting an event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StageEvent);
}

/// Default sink: forwards events to `tracing` at info level.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: StageEvent) {
        tracing::info!(kind = event.kind, payload = %event.payload, "stage event");
    }
}

/// Drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: StageEvent) {}
}

/// Progress callback for long-running work. Values are percentages in
/// [0, 100] and monotonically non-decreasing per operation.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;
