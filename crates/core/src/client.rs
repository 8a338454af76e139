//! The streaming completion client trait.
//!
//! A `CompletionClient` knows how to send a conversation plus a set of tool
//! schemas to a chat-completion service and return the response as a
//! sequence of incremental deltas. The channel closing signals the end of
//! the turn; no tool invocation is final until then.
//!
//! Deltas carry *raw* tool-call fragments tagged with a positional index.
//! The client never assembles them — reassembly by index is the agent
//! loop's responsibility, so it can emit text tokens with no buffering
//! while invocations are still arriving.

use crate::error::ClientError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A completion request: full message history plus declared tool schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool schemas the model may invoke
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool schema sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One increment of streamed model output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Text fragment to append to the current response
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool invocation fragments, in emission order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// One fragment of an in-progress tool invocation.
///
/// `index` is dense and starts at 0; it routes the fragment to the right
/// in-progress invocation when the model emits several concurrently. An
/// index may be referenced before earlier indices have been seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,

    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub arguments: Option<String>,
}

/// The streaming completion client contract.
///
/// The agent loops call `stream()` without knowing which backend is in
/// use. A transport failure surfaces either as an `Err` from `stream()`
/// or as an `Err` item on the returned channel; both are fatal to the run.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Open a streaming completion. Deltas arrive in emission order; the
    /// channel closes to signal turn completion.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, ClientError>>,
        ClientError,
    >;
}
