//! # Themis Agent
//!
//! The two-tier agent machinery: a worker loop that drives one model
//! through streamed tool calling, and a planner loop that fans a request
//! out to several concurrent workers and merges their live progress into
//! one ordered event stream.
//!
//! Both loops speak to the model through the `CompletionClient` trait and
//! report progress through a `tokio::sync::mpsc` channel of `AgentEvent`s,
//! so they can be exercised against scripted mocks without any network.

pub mod accumulate;
pub mod event;
pub mod mux;
pub mod planner;
pub mod prompts;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accumulate::ToolCallAccumulator;
pub use event::AgentEvent;
pub use mux::EventMultiplexer;
pub use planner::PlannerAgent;
pub use worker::WorkerAgent;
