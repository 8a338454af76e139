//! Error types for the Themis domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The split mirrors the
//! recovery rules of the agent loop: client errors are fatal to a run, tool
//! errors are fed back to the model as ordinary results.

use thiserror::Error;

/// The top-level error type for all Themis operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Completion client error: {0}")]
    Client(#[from] ClientError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the streaming completion client. Always fatal to the
/// agent run that hit them — they are never retried.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from tool execution. Recovered by the agent loop: the error
/// text becomes the tool's result so the model can self-correct.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
