//! The worker agent loop.
//!
//! Drives one model through the streamed tool-calling state machine:
//! stream a turn, reassemble tool invocations from fragments, execute
//! them sequentially, feed the results back, and loop until the model
//! answers in plain text or the iteration budget runs out.
//!
//! Text tokens are emitted the moment they arrive; nothing is buffered
//! beyond the current fragment. Tool failures are recovered locally as
//! error payloads the model can route around; only transport failures
//! are fatal to the run.

use crate::accumulate::ToolCallAccumulator;
use crate::event::AgentEvent;
use crate::prompts;
use serde_json::json;
use std::sync::Arc;
use themis_core::client::{CompletionClient, CompletionRequest};
use themis_core::error::Error;
use themis_core::message::{Conversation, Message, Role, ToolCall};
use themis_core::tool::ToolRegistry;
use themis_core::trace::{span_from, TraceSink, TraceSpan};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Informational token emitted when the iteration budget is exhausted.
pub const MAX_TOOL_CALLS_TOKEN: &str = "\n\nMax tool calls reached.";

pub struct WorkerAgent {
    client: Arc<dyn CompletionClient>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: usize,
    sink: Option<Arc<dyn TraceSink>>,
}

impl WorkerAgent {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            system_prompt: prompts::WORKER_SYSTEM_PROMPT.into(),
            max_iterations: 10,
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

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the loop to completion over the given conversation.
    ///
    /// Emits progress on `events` as it happens. `parent` nests this
    /// run's trace span under an enclosing run (the planner passes its
    /// own span here).
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        events: &mpsc::Sender<AgentEvent>,
        parent: Option<Arc<dyn TraceSpan>>,
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

        let span = span_from(
            parent.as_ref(),
            self.sink.as_ref(),
            "worker_run",
            json!({ "input": user_input }),
        );

        info!(
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Starting worker run"
        );

        let tool_definitions = self.tools.definitions();
        let mut final_text = String::new();

        for iteration in 1..=self.max_iterations {
            debug!(conversation_id = %conversation.id, iteration, "Worker iteration");

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
                g.end(json!({ "content": text, "tool_calls": calls.len() }));
            }

            if calls.is_empty() {
                // Terminal: the accumulated text is the answer
                if let Some(s) = &span {
                    s.update(json!({ "output": text }));
                    s.end();
                }
                return Ok(text);
            }

            conversation.push(Message::assistant_with_calls(text.clone(), calls.clone()));
            final_text = text;

            for call in &calls {
                let payload = self.invoke(call, events, span.as_ref()).await;
                conversation.push(Message::tool_result(&call.id, payload.to_string()));
            }
        }

        warn!(
            conversation_id = %conversation.id,
            max_iterations = self.max_iterations,
            "Iteration budget exhausted"
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

    /// Resolve one finalized invocation to its result payload, emitting
    /// tool events along the way. Never fails the run: every problem
    /// becomes an `{"error": ...}` payload the model sees as the result.
    async fn invoke(
        &self,
        call: &ToolCall,
        events: &mpsc::Sender<AgentEvent>,
        span: Option<&Arc<dyn TraceSpan>>,
    ) -> serde_json::Value {
        let arguments = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool arguments failed to parse");
                    return json!({ "error": format!("Invalid tool arguments: {e}") });
                }
            }
        };

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Unknown capability requested");
            return json!({ "error": format!("Unknown capability: {}", call.name) });
        };

        let _ = events
            .send(AgentEvent::ToolStart {
                name: call.name.clone(),
                input: arguments.clone(),
            })
            .await;

        let tool_span = span.map(|s| s.start_span(&call.name, arguments.clone()));

        let payload = match tool.execute(arguments).await {
            Ok(response) => response.payload(),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                json!({ "error": e.to_string() })
            }
        };

        if let Some(ts) = tool_span {
            ts.update(payload.clone());
            ts.end();
        }

        let _ = events
            .send(AgentEvent::ToolEnd {
                name: call.name.clone(),
                output: payload.clone(),
            })
            .await;

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use async_trait::async_trait;
    use themis_core::error::{ClientError, ToolError};
    use themis_core::tool::{Tool, ToolResponse};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResponse, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResponse::ok(json!({ "output": text })))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResponse, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    fn registry_with(tools: Vec<Box<dyn Tool>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Arc::new(registry)
    }

    async fn run_collecting(
        worker: &WorkerAgent,
        conversation: &mut Conversation,
    ) -> (Result<String, Error>, Vec<AgentEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let result = worker.run(conversation, &tx, None).await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn text_only_run_streams_tokens() {
        let client = Arc::new(SequentialMockClient::new(vec![vec![
            text_delta("Hel"),
            text_delta("lo"),
        ]]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![]));

        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "Hello");
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AgentEvent::Token { content } if content == "Hel"));
        assert!(matches!(&events[1], AgentEvent::Token { content } if content == "lo"));
        // Terminal iteration appends nothing
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn reassembles_fragmented_invocation() {
        let client = Arc::new(SequentialMockClient::new(vec![
            vec![
                fragment_delta(0, Some("call_1"), Some("sql"), Some("")),
                fragment_delta(0, None, None, Some("{\"query\"")),
                fragment_delta(0, None, None, Some(":\"SELECT 1\"}")),
            ],
            vec![text_delta("done")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![]));

        let mut conv = Conversation::new();
        conv.push(Message::user("count cases"));

        let (result, _events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "done");

        let assistant = conv
            .messages
            .iter()
            .find(|m| m.role == Role::Assistant)
            .unwrap();
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].name, "sql");
        assert_eq!(assistant.tool_calls[0].arguments, "{\"query\":\"SELECT 1\"}");
    }

    #[tokio::test]
    async fn unknown_capability_synthesized_without_execution() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_9", "frobnicate", "{}"),
            vec![text_delta("sorry")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(EchoTool)]));

        let mut conv = Conversation::new();
        conv.push(Message::user("do something odd"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "sorry");

        let tool_msg = conv.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(
            tool_msg.content,
            r#"{"error":"Unknown capability: frobnicate"}"#
        );
        // No tool events for an invocation that never executed
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolStart { .. } | AgentEvent::ToolEnd { .. })));
    }

    #[tokio::test]
    async fn executes_tool_and_feeds_result_back() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "echo", r#"{"text":"hello"}"#),
            vec![text_delta("final answer")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(EchoTool)]));

        let mut conv = Conversation::new();
        conv.push(Message::user("echo hello"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "final answer");

        let start_pos = events
            .iter()
            .position(|e| matches!(e, AgentEvent::ToolStart { name, .. } if name == "echo"))
            .unwrap();
        let end_pos = events
            .iter()
            .position(|e| matches!(e, AgentEvent::ToolEnd { name, .. } if name == "echo"))
            .unwrap();
        assert!(start_pos < end_pos);

        match &events[end_pos] {
            AgentEvent::ToolEnd { output, .. } => {
                assert_eq!(output, &json!({"output": "hello"}));
            }
            _ => unreachable!(),
        }

        let tool_msg = conv.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, r#"{"output":"hello"}"#);
    }

    #[tokio::test]
    async fn two_invocations_in_one_turn_run_in_order() {
        let client = Arc::new(SequentialMockClient::new(vec![
            vec![
                fragment_delta(0, Some("call_a"), Some("echo"), Some(r#"{"text":"one"}"#)),
                fragment_delta(1, Some("call_b"), Some("broken"), Some("{}")),
            ],
            vec![text_delta("done")],
        ]));
        let worker = WorkerAgent::new(
            client,
            "mock-model",
            registry_with(vec![Box::new(EchoTool), Box::new(BrokenTool)]),
        );

        let mut conv = Conversation::new();
        conv.push(Message::user("run both"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "done");

        // One start/end pair per invocation, in invocation order
        let tool_events: Vec<&AgentEvent> = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolStart { .. } | AgentEvent::ToolEnd { .. }))
            .collect();
        assert_eq!(tool_events.len(), 4);
        assert!(matches!(tool_events[0], AgentEvent::ToolStart { name, .. } if name == "echo"));
        assert!(matches!(tool_events[1], AgentEvent::ToolEnd { name, .. } if name == "echo"));
        assert!(matches!(tool_events[2], AgentEvent::ToolStart { name, .. } if name == "broken"));
        assert!(matches!(tool_events[3], AgentEvent::ToolEnd { name, .. } if name == "broken"));

        // One tool-result per invocation, each keyed by its id
        let tool_ids: Vec<_> = conv
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(
            tool_ids,
            vec![Some("call_a".to_string()), Some("call_b".to_string())]
        );
    }

    #[tokio::test]
    async fn tool_failure_recovered_as_error_payload() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "broken", "{}"),
            vec![text_delta("recovered")],
        ]));
        let worker =
            WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(BrokenTool)]));

        let mut conv = Conversation::new();
        conv.push(Message::user("try the broken one"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "recovered");

        let end = events
            .iter()
            .find(|e| matches!(e, AgentEvent::ToolEnd { .. }))
            .unwrap();
        match end {
            AgentEvent::ToolEnd { output, .. } => {
                assert!(output["error"].as_str().unwrap().contains("disk on fire"));
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn invalid_arguments_surface_without_execution() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "echo", "not valid json"),
            vec![text_delta("ok")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(EchoTool)]));

        let mut conv = Conversation::new();
        conv.push(Message::user("echo"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "ok");

        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolStart { .. })));
        let tool_msg = conv.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert!(tool_msg.content.contains("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn empty_arguments_become_empty_object() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "echo", ""),
            vec![text_delta("ok")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(EchoTool)]));

        let mut conv = Conversation::new();
        conv.push(Message::user("echo nothing"));

        let (_result, events) = run_collecting(&worker, &mut conv).await;
        let start = events
            .iter()
            .find(|e| matches!(e, AgentEvent::ToolStart { .. }))
            .unwrap();
        match start {
            AgentEvent::ToolStart { input, .. } => assert_eq!(input, &json!({})),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn iteration_cap_emits_marker_token() {
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "echo", r#"{"text":"a"}"#),
            call_script("call_2", "echo", r#"{"text":"b"}"#),
        ]));
        let worker = WorkerAgent::new(
            client.clone(),
            "mock-model",
            registry_with(vec![Box::new(EchoTool)]),
        )
        .with_max_iterations(2);

        let mut conv = Conversation::new();
        conv.push(Message::user("loop forever"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        let text = result.unwrap();
        assert!(text.ends_with(MAX_TOOL_CALLS_TOKEN));
        assert_eq!(client.call_count(), 2);

        match events.last().unwrap() {
            AgentEvent::Token { content } => assert_eq!(content, MAX_TOOL_CALLS_TOKEN),
            other => panic!("Expected final marker token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let client = Arc::new(SequentialMockClient::new(vec![vec![
            text_delta("partial"),
            Err(ClientError::StreamInterrupted("connection reset".into())),
        ]]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![]));

        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));

        let (result, events) = run_collecting(&worker, &mut conv).await;
        assert!(result.is_err());
        // Tokens produced before the failure were still delivered
        assert!(matches!(&events[0], AgentEvent::Token { content } if content == "partial"));
    }

    #[tokio::test]
    async fn system_prompt_inserted_once() {
        let client = Arc::new(SequentialMockClient::single_text("hi"));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![]))
            .with_system_prompt("custom rules");

        let mut conv = Conversation::new();
        conv.push(Message::user("hello"));

        let (_result, _events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(conv.messages[0].content, "custom rules");
        assert_eq!(conv.count_role(&Role::System), 1);
    }

    #[tokio::test]
    async fn trace_spans_recorded() {
        use themis_telemetry::RecordingSink;

        let sink = Arc::new(RecordingSink::new());
        let client = Arc::new(SequentialMockClient::new(vec![
            call_script("call_1", "echo", r#"{"text":"x"}"#),
            vec![text_delta("done")],
        ]));
        let worker = WorkerAgent::new(client, "mock-model", registry_with(vec![Box::new(EchoTool)]))
            .with_trace_sink(sink.clone());

        let mut conv = Conversation::new();
        conv.push(Message::user("trace me"));

        let (result, _events) = run_collecting(&worker, &mut conv).await;
        assert_eq!(result.unwrap(), "done");

        let runs = sink.records_named("worker_run");
        assert_eq!(runs.len(), 1);
        assert!(runs[0].ended_at.is_some());
        assert_eq!(sink.records_named("completion").len(), 2);
        assert_eq!(sink.records_named("echo").len(), 1);
    }
}
