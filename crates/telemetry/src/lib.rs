//! Trace recording for Themis agent runs.
//!
//! Implements the `TraceSink` contract from `themis-core` with an
//! in-memory recorder: every span and generation an agent run opens is
//! captured as a flat record with its parent id, so the tree can be
//! inspected or exported after the run. The sink is constructed once at
//! startup and injected into the agents.

pub mod recorder;

pub use recorder::{RecordKind, RecordingSink, SpanRecord};

use std::sync::Arc;
use themis_config::TelemetryConfig;
use themis_core::trace::TraceSink;

/// Build the trace sink for the process, or `None` when recording is
/// disabled. Agent behavior is identical either way.
pub fn sink_from_config(config: &TelemetryConfig) -> Option<Arc<dyn TraceSink>> {
    if config.enabled {
        Some(Arc::new(RecordingSink::new()))
    } else {
        None
    }
}
