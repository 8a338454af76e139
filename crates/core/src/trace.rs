//! Trace sink contract — optional hierarchical span recording.
//!
//! An agent run can be handed a `TraceSink` (or a parent `TraceSpan` from
//! an enclosing run) to record its model calls and tool executions for an
//! external observability collector. The relationship is purely additive:
//! when no sink is configured, behavior is identical.
//!
//! Sinks are constructed at process startup and injected — there is no
//! global lazily-initialized collector.

use serde_json::Value;
use std::sync::Arc;

/// A trace collector. Produces root spans.
pub trait TraceSink: Send + Sync {
    fn start_span(&self, name: &str, input: Value) -> Arc<dyn TraceSpan>;
}

/// One span in a trace tree. Spans nest: a planner run's span is the
/// parent of each delegated worker run's span.
pub trait TraceSpan: Send + Sync {
    /// Start a child span.
    fn start_span(&self, name: &str, input: Value) -> Arc<dyn TraceSpan>;

    /// Start a generation (one model call) under this span.
    fn start_generation(&self, name: &str, model: &str, input: Value)
        -> Arc<dyn TraceGeneration>;

    /// Attach final output to this span.
    fn update(&self, output: Value);

    /// Close this span.
    fn end(&self);
}

/// One recorded model call.
pub trait TraceGeneration: Send + Sync {
    /// Close the generation with its output.
    fn end(&self, output: Value);
}

/// Start a span from an optional parent or an optional sink, in that
/// order of preference. Returns `None` when neither is present.
pub fn span_from(
    parent: Option<&Arc<dyn TraceSpan>>,
    sink: Option<&Arc<dyn TraceSink>>,
    name: &str,
    input: Value,
) -> Option<Arc<dyn TraceSpan>> {
    if let Some(parent) = parent {
        Some(parent.start_span(name, input))
    } else {
        sink.map(|s| s.start_span(name, input))
    }
}
