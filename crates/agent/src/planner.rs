//! The planner agent loop.
//!
//! Same state machine as the worker, with one declared tool:
//! `research_agent`. Execution of that tool is intercepted — each named
//! invocation becomes a concurrently running worker, and the workers'
//! live events are merged through the multiplexer into the planner's own
//! event stream, wrapped as `DelegationEvent` and attributed by
//! invocation id. The planner joins on all delegations before its next
//! model turn.

use crate::accumulate::ToolCallAccumulator;
use crate::event::AgentEvent;
use crate::mux::EventMultiplexer;
use crate::prompts;
use crate::worker::{WorkerAgent, MAX_TOOL_CALLS_TOKEN};
use serde_json::json;
use std::sync::Arc;
use themis_core::client::{CompletionClient, CompletionRequest, ToolDefinition};
use themis_core::error::Error;
use themis_core::message::{Conversation, Message, Role, ToolCall};
use themis_core::trace::{TraceSink, TraceSpan};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The planner's single declared tool.
pub const DELEGATE_TOOL: &str = "research_agent";

/// Substituted when a delegation produced no text at all.
pub const NO_OUTPUT_PLACEHOLDER: &str = "Agent completed with no text output.";

fn delegate_definition() -> ToolDefinition {
    ToolDefinition {
        name: DELEGATE_TOOL.into(),
        description: "Delegate a research task to an autonomous agent with access to the \
                      case data tools. Instructions must be complete and self-contained."
            .into(),
        parameters: json!({
            "type": "object",
            "properties": {
                "instructions": {
                    "type": "string",
                    "description": "The research task to carry out"
                }
            },
            "required": ["instructions"]
        }),
    }
}

pub struct PlannerAgent {
    client: Arc<dyn CompletionClient>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    worker: Arc<WorkerAgent>,
    system_prompt: String,
    max_iterations: usize,
    event_buffer: usize,
    sink: Option<Arc<dyn TraceSink>>,
}

impl PlannerAgent {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        worker: Arc<WorkerAgent>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            worker,
            system_prompt: prompts::PLANNER_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            event_buffer: 256,
            sink: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the planner to completion over the given conversation.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Result<String, Error> {
        if conversation.messages.is_empty() || conversation.messages[0].role != Role::System {
            conversation
                .messages
                .insert(0, Message::system(&self.system_prompt));
        }

        let user_input = conversation
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let span = self
            .sink
            .as_ref()
            .map(|s| s.start_span("planner_run", json!({ "input": user_input })));

        info!(
            conversation_id = %conversation.id,
            "Starting planner run"
        );

        let tool_definitions = vec![delegate_definition()];
        let mut final_text = String::new();

        for iteration in 1..=self.max_iterations {
            debug!(conversation_id = %conversation.id, iteration, "Planner iteration");

            let request = CompletionRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let generation = span.as_ref().map(|s| {
                s.start_generation(
                    "completion",
                    &self.model,
                    json!({ "messages": request.messages.len() }),
                )
            });

            let mut rx = match self.client.stream(request).await {
                Ok(rx) => rx,
                Err(e) => {
                    if let Some(g) = generation {
                        g.end(json!({ "error": e.to_string() }));
                    }
                    if let Some(s) = &span {
                        s.end();
                    }
                    return Err(e.into());
                }
            };

            let mut text = String::new();
            let mut accumulator = ToolCallAccumulator::new();

            while let Some(item) = rx.recv().await {
                let delta = match item {
                    Ok(delta) => delta,
                    Err(e) => {
                        if let Some(g) = generation {
                            g.end(json!({ "error": e.to_string() }));
                        }
                        if let Some(s) = &span {
                            s.end();
                        }
                        return Err(e.into());
                    }
                };

                if let Some(content) = delta.content {
                    text.push_str(&content);
                    let _ = events.send(AgentEvent::Token { content }).await;
                }
                for fragment in &delta.tool_calls {
                    accumulator.apply(fragment);
                }
            }

            let calls = accumulator.finish();

            if let Some(g) = generation {
                g.end(json!({ "content": text, "delegations": calls.len() }));
            }

            if calls.is_empty() {
                if let Some(s) = &span {
                    s.update(json!({ "output": text }));
                    s.end();
                }
                return Ok(text);
            }

            conversation.push(Message::assistant_with_calls(text.clone(), calls.clone()));
            final_text = text;

            let results = match self.delegate(&calls, events, span.as_ref()).await {
                Ok(results) => results,
                Err(e) => {
                    if let Some(s) = &span {
                        s.end();
                    }
                    return Err(e);
                }
            };
            for (call, content) in calls.iter().zip(results) {
                conversation.push(Message::tool_result(&call.id, content));
            }
        }

        warn!(
            conversation_id = %conversation.id,
            max_iterations = self.max_iterations,
            "Planner iteration budget exhausted"
        );
        let _ = events
            .send(AgentEvent::Token {
                content: MAX_TOOL_CALLS_TOKEN.into(),
            })
            .await;
        final_text.push_str(MAX_TOOL_CALLS_TOKEN);

        if let Some(s) = &span {
            s.update(json!({ "output": final_text }));
            s.end();
        }
        Ok(final_text)
    }

    /// Execute one round of delegations concurrently.
    ///
    /// All `DelegationStart` events go out before any worker produces
    /// output. Worker events are merged live through the multiplexer; a
    /// worker's fatal error is re-raised only after every sibling has
    /// finished emitting. Returns one tool-result content per invocation,
    /// in invocation order.
    async fn delegate(
        &self,
        calls: &[ToolCall],
        events: &mpsc::Sender<AgentEvent>,
        span: Option<&Arc<dyn TraceSpan>>,
    ) -> Result<Vec<String>, Error> {
        let mut results: Vec<Option<String>> = vec![None; calls.len()];
        let mut delegations = Vec::new();

        for (pos, call) in calls.iter().enumerate() {
            match parse_instructions(&call.arguments) {
                Ok(instructions) => delegations.push((pos, call.id.clone(), instructions)),
                Err(message) => {
                    warn!(id = %call.id, %message, "Delegation arguments rejected");
                    results[pos] = Some(json!({ "error": message }).to_string());
                }
            }
        }

        // Announce every delegation before any output is produced
        for (_, id, instructions) in &delegations {
            let _ = events
                .send(AgentEvent::DelegationStart {
                    id: id.clone(),
                    instructions: instructions.clone(),
                })
                .await;
        }

        let expected = delegations.len();
        let mux = EventMultiplexer::new(self.event_buffer);
        let mut handles = Vec::new();

        for (pos, id, instructions) in delegations {
            let mux_tx = mux.handle();
            let worker = self.worker.clone();
            let parent = span.cloned();
            let capacity = self.event_buffer;

            let handle = tokio::spawn(async move {
                let (inner_tx, mut inner_rx) = mpsc::channel(capacity);

                let mut conv = Conversation::new();
                conv.push(Message::user(instructions));
                let run = tokio::spawn(async move {
                    worker.run(&mut conv, &inner_tx, parent).await
                });

                let mut accumulated = String::new();
                while let Some(event) = inner_rx.recv().await {
                    if let AgentEvent::Token { content } = &event {
                        accumulated.push_str(content);
                    }
                    let _ = mux_tx
                        .send(AgentEvent::DelegationEvent {
                            id: id.clone(),
                            event: Box::new(event),
                        })
                        .await;
                }

                let outcome = match run.await {
                    Ok(result) => result,
                    Err(e) => Err(Error::Internal(format!("delegated run panicked: {e}"))),
                };

                // The end marker goes out on success and failure alike;
                // the multiplexer counts on it
                let _ = mux_tx
                    .send(AgentEvent::DelegationEnd {
                        id: id.clone(),
                        result: accumulated.clone(),
                    })
                    .await;

                (accumulated, outcome)
            });
            handles.push((pos, handle));
        }

        mux.forward_until_complete(events, expected).await;

        let mut failure: Option<Error> = None;
        for (pos, handle) in handles {
            let (accumulated, outcome) = handle
                .await
                .map_err(|e| Error::Internal(format!("delegation task panicked: {e}")))?;
            if let Err(e) = outcome {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
            let content = if accumulated.trim().is_empty() {
                NO_OUTPUT_PLACEHOLDER.to_string()
            } else {
                accumulated
            };
            results[pos] = Some(content);
        }

        if let Some(e) = failure {
            return Err(e);
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| NO_OUTPUT_PLACEHOLDER.to_string()))
            .collect())
    }
}

fn parse_instructions(arguments: &str) -> Result<String, String> {
    let value: serde_json::Value = if arguments.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(arguments)
            .map_err(|e| format!("Invalid tool arguments: {e}"))?
    };
    value["instructions"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| "Invalid tool arguments: missing 'instructions'".to_string())
}
