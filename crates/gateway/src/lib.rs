//! HTTP gateway for Themis.
//!
//! Two endpoints: `GET /health`, and `POST /query` which runs the planner
//! and streams its events over SSE — one JSON record per event, emitted
//! the moment it is produced, terminated by a `{"type":"done"}` marker
//! (or an `error` record when the run fails).
//!
//! Built on Axum.

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use themis_agent::{AgentEvent, PlannerAgent, WorkerAgent};
use themis_core::message::{Conversation, Message};
use themis_providers::OpenAiCompatClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info, trace};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub planner: Arc<PlannerAgent>,
    pub event_buffer: usize,
}

type SharedState = Arc<GatewayState>;

/// One record on the outgoing SSE stream.
enum StreamItem {
    Event(AgentEvent),
    Error(String),
    Done,
}

impl StreamItem {
    fn to_json(&self) -> String {
        match self {
            Self::Event(event) => {
                serde_json::to_string(event).unwrap_or_else(|e| {
                    serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
                })
            }
            Self::Error(message) => {
                serde_json::json!({ "type": "error", "message": message }).to_string()
            }
            Self::Done => serde_json::json!({ "type": "done" }).to_string(),
        }
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/query", post(query_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: themis_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let api_key = config.api_key.clone().ok_or("No API key configured — set OPENROUTER_API_KEY")?;
    let client = Arc::new(OpenAiCompatClient::new(
        "openrouter",
        &config.base_url,
        api_key,
    )?);
    let tools = themis_tools::default_registry(&config);
    let sink = themis_telemetry::sink_from_config(&config.telemetry);

    let mut worker = WorkerAgent::new(client.clone(), &config.model, tools)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_max_iterations(config.agent.max_iterations);
    if let Some(sink) = &sink {
        worker = worker.with_trace_sink(sink.clone());
    }

    let mut planner = PlannerAgent::new(client, &config.model, Arc::new(worker))
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_max_iterations(config.agent.max_iterations)
        .with_event_buffer(config.agent.event_buffer);
    if let Some(sink) = sink {
        planner = planner.with_trace_sink(sink);
    }

    let state = Arc::new(GatewayState {
        planner: Arc::new(planner),
        event_buffer: config.agent.event_buffer,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

async fn query_handler(
    State(state): State<SharedState>,
    Json(payload): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    info!(query_len = payload.query.len(), "Query received");

    let (out_tx, out_rx) = mpsc::channel::<StreamItem>(state.event_buffer);
    let planner = state.planner.clone();
    let capacity = state.event_buffer;

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(capacity);

        // Forward agent events to the SSE stream as they arrive
        let forward_tx = out_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                trace!(event_type = event.event_type(), "Forwarding event");
                if forward_tx.send(StreamItem::Event(event)).await.is_err() {
                    return;
                }
            }
        });

        let mut conversation = Conversation::new();
        conversation.push(Message::user(payload.query));

        let result = planner.run(&mut conversation, &event_tx).await;
        drop(event_tx);
        let _ = forwarder.await;

        match result {
            Ok(_) => {
                let _ = out_tx.send(StreamItem::Done).await;
            }
            Err(e) => {
                error!(error = %e, "Planner run failed");
                let _ = out_tx.send(StreamItem::Error(e.to_string())).await;
            }
        }
    });

    let stream = ReceiverStream::new(out_rx)
        .map(|item| Ok(SseEvent::default().data(item.to_json())));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use themis_core::tool::ToolRegistry;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let client = Arc::new(
            OpenAiCompatClient::new("test", "http://127.0.0.1:1", "test-key").unwrap(),
        );
        let worker = Arc::new(WorkerAgent::new(
            client.clone(),
            "mock-model",
            Arc::new(ToolRegistry::new()),
        ));
        let planner = Arc::new(PlannerAgent::new(client, "mock-model", worker));
        Arc::new(GatewayState {
            planner,
            event_buffer: 64,
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state());

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn query_requires_json_body() {
        let app = build_router(test_state());

        let req = Request::builder()
            .method("POST")
            .uri("/query")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[test]
    fn stream_items_serialize() {
        assert_eq!(StreamItem::Done.to_json(), r#"{"type":"done"}"#);
        assert_eq!(
            StreamItem::Error("boom".into()).to_json(),
            r#"{"message":"boom","type":"error"}"#
        );
        let event = StreamItem::Event(AgentEvent::Token {
            content: "hi".into(),
        });
        assert!(event.to_json().contains(r#""type":"token""#));
    }
}
