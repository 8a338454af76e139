//! Tool trait — the contract for agent capabilities.
//!
//! Tools are what give the agent the ability to act: explore the case data
//! directory, run a semantic search, and so on. Each tool is a black box
//! to the loop: it describes its callable shape and executes structured
//! input. Tools are expected to enforce their own time bounds — the loop
//! treats a tool timeout like any other tool failure.

use crate::client::ToolDefinition;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The outcome of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Structured output payload
    pub data: serde_json::Value,

    /// Error text when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    /// A successful response carrying the given payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// A failed response carrying the given error text.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Object(serde_json::Map::new()),
            error: Some(error.into()),
        }
    }

    /// The payload fed back to the model: the data on success, or an
    /// `{"error": ...}` object on failure.
    pub fn payload(&self) -> serde_json::Value {
        if self.success {
            self.data.clone()
        } else {
            serde_json::json!({
                "error": self.error.clone().unwrap_or_else(|| "Unknown error".into())
            })
        }
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "bash", "search_cases").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parsed arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResponse, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to get the schema set to declare to the model
/// and to look up tools when the model requests them. A lookup miss is not
/// an error at this level — the loop synthesizes an unknown-capability
/// result without calling anything.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for declaring to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
