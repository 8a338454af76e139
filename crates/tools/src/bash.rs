//! Bash tool — explore the case data directory.
//!
//! Commands run with the data directory as working directory, against an
//! allowlist of read-oriented commands, under a wall-clock timeout. Output
//! beyond the character limit is truncated so one `cat` of a large filing
//! cannot blow up the conversation.

use async_trait::async_trait;
use std::path::PathBuf;
use themis_config::ToolsConfig;
use themis_core::error::ToolError;
use themis_core::tool::{Tool, ToolResponse};
use tokio::process::Command;
use tracing::{debug, warn};

pub struct BashTool {
    data_dir: PathBuf,
    allowed_commands: Vec<String>,
    timeout_secs: u64,
    output_limit_chars: usize,
}

impl BashTool {
    pub fn new(
        data_dir: PathBuf,
        allowed_commands: Vec<String>,
        timeout_secs: u64,
        output_limit_chars: usize,
    ) -> Self {
        Self {
            data_dir,
            allowed_commands,
            timeout_secs,
            output_limit_chars,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            config.data_dir.clone(),
            config.allowed_commands.clone(),
            config.bash_timeout_secs,
            config.output_limit_chars,
        )
    }

    fn is_command_allowed(&self, command: &str) -> bool {
        if self.allowed_commands.is_empty() {
            return false; // Empty allowlist = deny all
        }

        let base_cmd = command.split_whitespace().next().unwrap_or("").trim();
        self.allowed_commands.iter().any(|a| a == base_cmd)
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() <= self.output_limit_chars {
            return text;
        }
        let mut truncated: String = text.chars().take(self.output_limit_chars).collect();
        truncated.push_str("\n... [output truncated]");
        truncated
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run a bash command in the case data directory. Use this to list, read, \
         and search case files (ls, cat, grep, find, etc.)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to run"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResponse, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        if !self.is_command_allowed(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "bash".into(),
                reason: format!(
                    "Command '{}' not in allowlist",
                    command.split_whitespace().next().unwrap_or("")
                ),
            });
        }

        debug!(command = %command, "Executing bash command");

        let run = Command::new("bash")
            .args(["-c", command])
            .current_dir(&self.data_dir)
            .output();

        let output = tokio::time::timeout(std::time::Duration::from_secs(self.timeout_secs), run)
            .await
            .map_err(|_| ToolError::Timeout {
                tool_name: "bash".into(),
                timeout_secs: self.timeout_secs,
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "bash".into(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        let combined = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            stderr
        } else {
            format!("{stdout}\n[stderr]: {stderr}")
        };
        let combined = self.truncate(combined.trim().to_string());

        if !output.status.success() {
            warn!(command = %command, exit_code, "Command failed");
            return Ok(ToolResponse::fail(format!(
                "[exit code: {exit_code}]\n{combined}"
            )));
        }

        Ok(ToolResponse::ok(serde_json::json!({
            "output": combined,
            "exit_code": exit_code,
        })))
    }
}
