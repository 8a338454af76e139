//! Configuration loading, validation, and management for Themis.
//!
//! Loads configuration from `~/.themis/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.themis/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenRouter API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for both the planner and delegated workers
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for model calls
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Case search service configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Trace recording configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("search", &self.search)
            .field("gateway", &self.gateway)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

/// Bounds on the agent loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Max tool-execution iterations per run before the loop forces a
    /// final answer
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Buffer capacity of the per-run event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_iterations() -> usize {
    10
}
fn default_event_buffer() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Tool execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Root of the case data directory; bash commands run here
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Commands the bash tool will run. Empty = deny all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Wall-clock limit for one bash command, in seconds
    #[serde(default = "default_bash_timeout")]
    pub bash_timeout_secs: u64,

    /// Tool output beyond this many characters is truncated
    #[serde(default = "default_output_limit")]
    pub output_limit_chars: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "grep", "find", "wc", "file", "du"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_bash_timeout() -> u64 {
    20
}
fn default_output_limit() -> usize {
    10_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            allowed_commands: default_allowed_commands(),
            bash_timeout_secs: default_bash_timeout(),
            output_limit_chars: default_output_limit(),
        }
    }
}

/// The external semantic case-search service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the search service
    #[serde(default = "default_search_url")]
    pub base_url: String,

    /// Collection of indexed case documents to query
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on results per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_url() -> String {
    "http://127.0.0.1:9200".into()
}
fn default_collection() -> String {
    "case_documents".into()
}
fn default_search_timeout() -> u64 {
    30
}
fn default_max_results() -> usize {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_url(),
            collection: default_collection(),
            timeout_secs: default_search_timeout(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Trace recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether agent runs record trace spans
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.themis/config.toml).
    ///
    /// Environment variables take priority over the file:
    /// - `OPENROUTER_API_KEY` — API key
    /// - `OPENROUTER_MODEL` — model override
    /// - `THEMIS_DATA_DIR` — case data directory
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.model = model;
        }
        if let Ok(dir) = std::env::var("THEMIS_DATA_DIR") {
            config.tools.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".themis")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "search.max_results must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            search: SearchConfig::default(),
            gateway: GatewayConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
