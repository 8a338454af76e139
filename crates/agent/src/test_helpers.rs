//! Shared test helpers for agent loop tests.

use async_trait::async_trait;
use std::sync::Mutex;
use themis_core::client::{CompletionClient, CompletionRequest, StreamDelta, ToolCallDelta};
use themis_core::error::ClientError;
use themis_core::message::Role;
use tokio::sync::mpsc;

/// One scripted model turn: the deltas the stream will yield, in order.
pub type Script = Vec<Result<StreamDelta, ClientError>>;

/// A delta carrying only text.
pub fn text_delta(content: &str) -> Result<StreamDelta, ClientError> {
    Ok(StreamDelta {
        content: Some(content.into()),
        tool_calls: vec![],
    })
}

/// A delta carrying one tool-call fragment.
pub fn fragment_delta(
    index: usize,
    id: Option<&str>,
    name: Option<&str>,
    arguments: Option<&str>,
) -> Result<StreamDelta, ClientError> {
    Ok(StreamDelta {
        content: None,
        tool_calls: vec![ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: arguments.map(String::from),
        }],
    })
}

/// A one-fragment invocation with complete id, name, and arguments.
pub fn call_script(id: &str, name: &str, arguments: &str) -> Script {
    vec![fragment_delta(0, Some(id), Some(name), Some(arguments))]
}

fn feed(script: Script) -> mpsc::Receiver<Result<StreamDelta, ClientError>> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for item in script {
            if tx.send(item).await.is_err() {
                return;
            }
        }
    });
    rx
}

/// A mock client that plays back a sequence of scripted turns.
///
/// Each call to `stream` consumes the next script. Panics if more calls
/// are made than scripts provided.
pub struct SequentialMockClient {
    scripts: Mutex<Vec<Script>>,
    calls: Mutex<usize>,
}

impl SequentialMockClient {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            calls: Mutex::new(0),
        }
    }

    /// A client that answers once with plain text and no tool calls.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![vec![text_delta(text)]])
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl CompletionClient for SequentialMockClient {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<StreamDelta, ClientError>>,
        ClientError,
    > {
        let mut calls = self.calls.lock().unwrap();
        let mut scripts = self.scripts.lock().unwrap();

        if scripts.is_empty() {
            panic!("SequentialMockClient: no more scripts (call #{})", *calls + 1);
        }
        *calls += 1;
        let script = scripts.remove(0);
        drop(scripts);

        Ok(feed(script))
    }
}

/// A mock client that routes by the last user message.
///
/// Needed when concurrent worker runs share one client: each run is
/// keyed by a substring of its instructions, so arrival order does not
/// matter. Scripts under one key are consumed in order.
pub struct RoutedMockClient {
    routes: Mutex<Vec<(String, Vec<Script>)>>,
}

impl RoutedMockClient {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, key: &str, scripts: Vec<Script>) -> Self {
        self.routes.lock().unwrap().push((key.into(), scripts));
        self
    }
}

#[async_trait]
impl CompletionClient for RoutedMockClient {
    fn name(&self) -> &str {
        "routed_mock"
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<StreamDelta, ClientError>>,
        ClientError,
    > {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let mut routes = self.routes.lock().unwrap();
        let entry = routes
            .iter_mut()
            .find(|(key, _)| last_user.contains(key.as_str()));

        let Some((key, scripts)) = entry else {
            panic!("RoutedMockClient: no route matches user message {last_user:?}");
        };
        if scripts.is_empty() {
            panic!("RoutedMockClient: scripts exhausted for route {key:?}");
        }
        let script = scripts.remove(0);
        drop(routes);

        Ok(feed(script))
    }
}
