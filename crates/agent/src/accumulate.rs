//! Tool-call fragment reassembly.
//!
//! The streaming client forwards tool-call fragments raw; this accumulator
//! routes them by positional index into growing slots. Ids replace, names
//! and argument text append in arrival order. Slots the model never named
//! are dropped at finish — an invocation with no name cannot execute.

use themis_core::client::ToolCallDelta;
use themis_core::message::ToolCall;

#[derive(Debug, Default)]
struct Slot {
    id: String,
    name: String,
    arguments: String,
}

/// Assembles streamed `ToolCallDelta` fragments into finalized `ToolCall`s.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: Vec<Slot>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment. Indices may arrive out of order; slots up to
    /// the referenced index are pre-allocated.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        while self.slots.len() <= delta.index {
            self.slots.push(Slot::default());
        }
        let slot = &mut self.slots[delta.index];

        if let Some(id) = &delta.id {
            slot.id = id.clone();
        }
        if let Some(name) = &delta.name {
            slot.name.push_str(name);
        }
        if let Some(arguments) = &delta.arguments {
            slot.arguments.push_str(arguments);
        }
    }

    /// Whether any slot has been named so far.
    pub fn has_named(&self) -> bool {
        self.slots.iter().any(|s| !s.name.is_empty())
    }

    /// Finalize: named invocations in slot order. Unnamed slots are
    /// dropped.
    pub fn finish(self) -> Vec<ToolCall> {
        self.slots
            .into_iter()
            .filter(|s| !s.name.is_empty())
            .map(|s| ToolCall {
                id: s.id,
                name: s.name,
                arguments: s.arguments,
            })
            .collect()
    }
}
