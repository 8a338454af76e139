//! Agent progress events.
//!
//! Events are transient: they describe the live progress of one run and
//! are never persisted. The gateway forwards them to clients over SSE;
//! the planner wraps each delegated worker's events in `DelegationEvent`
//! so the consumer can attribute interleaved output.

use serde::{Deserialize, Serialize};

/// Events emitted by an agent run as it executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text token from the model.
    Token { content: String },

    /// A tool is about to execute.
    ToolStart {
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed (the output carries an `error` key when
    /// it failed).
    ToolEnd {
        name: String,
        output: serde_json::Value,
    },

    /// The planner delegated a task to a worker. `id` correlates all
    /// later events for this delegation.
    DelegationStart { id: String, instructions: String },

    /// An event produced inside a delegated worker run.
    DelegationEvent { id: String, event: Box<AgentEvent> },

    /// A delegated worker run finished; `result` is its accumulated text.
    DelegationEnd { id: String, result: String },
}

impl AgentEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::DelegationStart { .. } => "delegation_start",
            Self::DelegationEvent { .. } => "delegation_event",
            Self::DelegationEnd { .. } => "delegation_end",
        }
    }
}
