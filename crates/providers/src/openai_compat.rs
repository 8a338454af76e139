//! OpenAI-compatible streaming client.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, Together AI, and any
//! endpoint that speaks the OpenAI `/v1/chat/completions` SSE protocol.
//!
//! The client is a thin transport: it parses SSE lines into deltas and
//! forwards tool-call fragments *raw*, tagged with their positional index.
//! Reassembling fragments into complete invocations is the agent loop's
//! job, not the client's.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use themis_core::client::{CompletionClient, CompletionRequest, StreamDelta, ToolCallDelta};
use themis_core::error::ClientError;
use themis_core::message::{Message, Role};
use themis_core::ToolDefinition;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible streaming completion client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        // No total timeout: responses stream for as long as the model
        // talks. Only the connection attempt itself is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenRouter client (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamDelta, ClientError>>,
        ClientError,
    > {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(client = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ClientError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ClientError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Completion service returned error");
            return Err(ClientError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let client_name = self.name.clone();

        // Read the SSE byte stream and forward parsed deltas
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ClientError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();

                        // "[DONE]" signals end of stream; the channel
                        // closing is the completion signal downstream
                        if data == "[DONE]" {
                            return;
                        }

                        match serde_json::from_str::<StreamResponse>(data) {
                            Ok(stream_resp) => {
                                let Some(choice) = stream_resp.choices.into_iter().next() else {
                                    continue;
                                };

                                let delta = to_stream_delta(choice.delta);
                                if delta.content.is_none() && delta.tool_calls.is_empty() {
                                    continue;
                                }

                                if tx.send(Ok(delta)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                            Err(e) => {
                                trace!(
                                    client = %client_name,
                                    data = %data,
                                    error = %e,
                                    "Ignoring unparseable SSE chunk"
                                );
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Flatten the wire delta into the domain delta, keeping fragments raw.
fn to_stream_delta(delta: ApiStreamDelta) -> StreamDelta {
    let tool_calls = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallDelta {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();

    StreamDelta {
        content: delta.content.filter(|c| !c.is_empty()),
        tool_calls,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: ApiStreamDelta,
}

#[derive(Debug, Deserialize)]
struct ApiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCallDelta>>,
}

/// A tool call fragment — arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use themis_core::message::ToolCall;

    #[test]
    fn openrouter_constructor() {
        let client = OpenAiCompatClient::openrouter("sk-test").unwrap();
        assert_eq!(client.name(), "openrouter");
        assert!(client.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatClient::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a bash command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatClient::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "bash");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_calls(
            "thinking...",
            vec![ToolCall {
                id: "call_1".into(),
                name: "bash".into(),
                arguments: r#"{"command":"ls"}"#.into(),
            }],
        );
        let api_msgs = OpenAiCompatClient::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 1);
        assert_eq!(tc[0].function.name, "bash");
    }

    #[test]
    fn message_conversion_tool_response() {
        let msg = Message::tool_result("call_1", "result data");
        let api_msgs = OpenAiCompatClient::to_api_messages(&[msg]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    // --- SSE parsing tests ---

    #[test]
    fn parse_stream_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_stream_tool_call_delta() {
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"bash","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc.index, 0);
        assert_eq!(tc.id.as_deref(), Some("call_abc"));
        assert_eq!(tc.function.as_ref().unwrap().name.as_deref(), Some("bash"));
    }

    #[test]
    fn parse_stream_tool_call_arguments_delta() {
        // Arguments arrive incrementally as fragments
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"command\""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tc = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert!(tc.id.is_none()); // ID only in first delta
        assert_eq!(
            tc.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"command\"")
        );
    }

    #[test]
    fn fragments_forwarded_raw() {
        // A follow-up arguments fragment must come through untouched, not
        // merged into the earlier delta for the same index
        let delta = to_stream_delta(ApiStreamDelta {
            content: None,
            tool_calls: Some(vec![ApiToolCallDelta {
                index: 1,
                id: None,
                function: Some(ApiFunctionDelta {
                    name: None,
                    arguments: Some(": \"SELECT 1\"}".into()),
                }),
            }]),
        });
        assert!(delta.content.is_none());
        assert_eq!(delta.tool_calls.len(), 1);
        assert_eq!(delta.tool_calls[0].index, 1);
        assert!(delta.tool_calls[0].name.is_none());
        assert_eq!(
            delta.tool_calls[0].arguments.as_deref(),
            Some(": \"SELECT 1\"}")
        );
    }

    #[test]
    fn empty_content_dropped() {
        let delta = to_stream_delta(ApiStreamDelta {
            content: Some(String::new()),
            tool_calls: None,
        });
        assert!(delta.content.is_none());
        assert!(delta.tool_calls.is_empty());
    }

    #[test]
    fn parse_multiple_tool_calls_in_stream() {
        // Two parallel tool calls in one delta
        let data = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"bash","arguments":""}},{"index":1,"id":"call_b","function":{"name":"search_cases","arguments":""}}]},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        let tcs = parsed.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(tcs.len(), 2);
        assert_eq!(tcs[0].index, 0);
        assert_eq!(tcs[1].index, 1);
    }

    #[test]
    fn parse_empty_delta() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
        assert!(parsed.choices[0].delta.tool_calls.is_none());
    }
}
