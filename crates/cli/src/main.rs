//! Themis CLI — the main entry point.
//!
//! Commands:
//! - `serve` — Start the HTTP gateway
//! - `ask`   — Run a single research query from the terminal

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use themis_agent::{AgentEvent, PlannerAgent, WorkerAgent};
use themis_config::AppConfig;
use themis_core::message::{Conversation, Message};
use themis_providers::OpenAiCompatClient;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "themis",
    about = "Themis — legal research agent backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a single research question and stream the answer
    Ask {
        /// The question to research
        question: String,

        /// Print every agent event as a JSON line instead of plain text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => serve(port).await,
        Commands::Ask { question, json } => ask(question, json).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("failed to load configuration")?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    themis_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))
}

async fn ask(question: String, json: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    let planner = build_planner(&config)?;

    let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(config.agent.event_buffer);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = event_rx.recv().await {
            if json {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("failed to serialize event: {e}"),
                }
                continue;
            }
            match event {
                AgentEvent::Token { content } => {
                    print!("{content}");
                    let _ = stdout.flush();
                }
                AgentEvent::DelegationStart { id, instructions } => {
                    info!(delegation = %id, instructions = %instructions, "Delegation started");
                }
                AgentEvent::DelegationEnd { id, .. } => {
                    info!(delegation = %id, "Delegation finished");
                }
                AgentEvent::ToolStart { name, .. } => {
                    info!(tool = %name, "Tool started");
                }
                _ => {}
            }
        }
    });

    let mut conversation = Conversation::new();
    conversation.push(Message::user(question));

    let result = planner.run(&mut conversation, &event_tx).await;
    drop(event_tx);
    let _ = printer.await;

    match result {
        Ok(_) => {
            if !json {
                println!();
            }
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)).context("research run failed"),
    }
}

fn build_planner(config: &AppConfig) -> anyhow::Result<PlannerAgent> {
    let api_key = config
        .api_key
        .clone()
        .context("no API key configured — set OPENROUTER_API_KEY")?;
    let client = Arc::new(OpenAiCompatClient::new(
        "openrouter",
        &config.base_url,
        api_key,
    )?);
    let tools = themis_tools::default_registry(config);
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

    Ok(planner)
}
