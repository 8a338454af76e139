//! # Themis Core
//!
//! Domain types, traits, and error definitions for the Themis research
//! agent. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the streaming
//! completion client, the tool contract, the trace sink. Implementations
//! live in their respective crates, so the agent loops can be exercised
//! against scripted mocks without any network access.

pub mod client;
pub mod error;
pub mod message;
pub mod tool;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use client::{CompletionClient, CompletionRequest, StreamDelta, ToolCallDelta, ToolDefinition};
pub use error::{ClientError, Error, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, Role, ToolCall};
pub use tool::{Tool, ToolRegistry, ToolResponse};
pub use trace::{TraceGeneration, TraceSink, TraceSpan};
