//! LLM API boundary.
//!
//! A request is a single user-role prompt plus model parameters; a response
//! is raw text. Two backends exist: the Anthropic Messages API over HTTP, and
//! a local command that reads the prompt on stdin and answers on stdout
//! (for local models, wrappers, and offline replay).
//!
//! The command is resolved in priority order:
//! 1. `--lm` CLI flag (forces the command backend)
//! 2. `llm.command` in `config.json`, when `llm.backend` is `command`
//! 3. `AENRICH_LM_COMMAND` environment variable, same condition

use crate::error::{EnrichError, EnrichResult, LlmError};
use crate::extract::preview;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub const LM_COMMAND_ENV: &str = "AENRICH_LM_COMMAND";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt: String,
}

/// Anything that turns a prompt into raw text.
pub trait LlmClient: Send + Sync {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackend {
    Anthropic,
    Command,
}

/// The `llm` section of the workspace config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            base_url: "https://api.anthropic.com".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            timeout_secs: 120,
            command: None,
        }
    }
}

impl LlmSettings {
    /// Request template for a prompt.
    pub fn request(&self, prompt: String) -> LlmRequest {
        LlmRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            prompt,
        }
    }
}

/// Build the configured client. A `command_override` forces the command
/// backend.
pub fn build_client(
    settings: &LlmSettings,
    command_override: Option<&str>,
) -> EnrichResult<Box<dyn LlmClient>> {
    if let Some(command) = command_override {
        return Ok(Box::new(CommandLlmClient::new(command)?));
    }
    match settings.backend {
        LlmBackend::Anthropic => Ok(Box::new(HttpLlmClient::new(settings))),
        LlmBackend::Command => {
            let command = settings
                .command
                .clone()
                .or_else(|| std::env::var(LM_COMMAND_ENV).ok())
                .ok_or_else(|| {
                    EnrichError::config(format!(
                        "llm.backend is \"command\" but no command is configured \
                         (set llm.command, pass --lm, or export {LM_COMMAND_ENV})"
                    ))
                })?;
            Ok(Box::new(CommandLlmClient::new(&command)?))
        }
    }
}

/// Anthropic Messages API client.
pub struct HttpLlmClient {
    agent: ureq::Agent,
    base_url: String,
    api_key_env: String,
}

impl HttpLlmClient {
    pub fn new(settings: &LlmSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(settings.timeout_secs.max(1))))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key_env: settings.api_key_env.clone(),
        }
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Unauthorized(format!(
                    "environment variable {} is not set",
                    self.api_key_env
                ))
            })?;
        let body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let start = Instant::now();
        let mut response = self
            .agent
            .post(&format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .send_json(&body)
            .map_err(classify_transport)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.body_mut().read_to_string().unwrap_or_default();
            return Err(LlmError::from_status(status, error_message(&text)));
        }
        let envelope: Value = response
            .body_mut()
            .read_json()
            .map_err(|err| LlmError::InvalidResponse(format!("decode response body: {err}")))?;
        let text = text_from_envelope(&envelope)?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = request.prompt.len(),
            response_bytes = text.len(),
            "lm invoke complete"
        );
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("anthropic ({})", self.base_url)
    }
}

fn classify_transport(err: ureq::Error) -> LlmError {
    match err {
        ureq::Error::Timeout(timeout) => LlmError::Timeout(timeout.to_string()),
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            LlmError::Timeout(io.to_string())
        }
        other => LlmError::Transport(other.to_string()),
    }
}

/// Concatenate the text blocks of a Messages API response.
fn text_from_envelope(envelope: &Value) -> Result<String, LlmError> {
    let blocks = envelope
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse(
            "response has no text content".to_string(),
        ));
    }
    Ok(text)
}

/// Provider error message if the body has one, else a preview of the body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| preview(body, 300))
}

/// Pipes the prompt to a local command.
#[derive(Debug, Clone)]
pub struct CommandLlmClient {
    command: String,
    args: Vec<String>,
}

impl CommandLlmClient {
    pub fn new(command: &str) -> EnrichResult<Self> {
        let args = shell_words::split(command)
            .map_err(|err| EnrichError::config(format!("parse LM command {command:?}: {err}")))?;
        if args.is_empty() {
            return Err(EnrichError::config("LM command is empty"));
        }
        Ok(Self {
            command: command.to_string(),
            args,
        })
    }
}

impl LlmClient for CommandLlmClient {
    fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        let mut child = Command::new(&self.args[0])
            .args(&self.args[1..])
            .env("AENRICH_MODEL", &request.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| LlmError::Transport(format!("spawn LM command {}: {err}", self.args[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.prompt.as_bytes())
                .map_err(|err| LlmError::Transport(format!("write prompt to LM stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| LlmError::Transport(format!("wait for LM command: {err}")))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = request.prompt.len(),
            response_bytes = output.stdout.len(),
            "lm invoke complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::Transport(format!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| LlmError::InvalidResponse(format!("decode LM stdout as UTF-8: {err}")))
    }

    fn describe(&self) -> String {
        format!("command ({})", self.command)
    }
}
