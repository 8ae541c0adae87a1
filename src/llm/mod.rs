//! Generic LLM client infrastructure.
//!
//! This module provides the client trait and the concrete providers. Prompting
//! and response normalization for code review live in `analysis`.
//!
//! # Configuration
//!
//! LLM settings can be configured via:
//! - CLI arguments: `--llm-provider`, `--llm-model`, `--llm-base-url`
//! - Environment variables: `ALIBOT_LLM_PROVIDER`, `ALIBOT_LLM_MODEL`,
//!   `ALIBOT_LLM_BASE_URL`, `GROQ_API`
//!
//! CLI arguments take precedence over environment variables.

mod chat;

pub use chat::ChatCompletionsClient;

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use log::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "deepseek-r1-distill-llama-70b";

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions API (Groq by default)
    #[default]
    Groq,
    /// Local Claude CLI
    Claude,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Groq => write!(f, "groq"),
            Self::Claude => write!(f, "claude"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "claude" => Ok(Self::Claude),
            _ => Err(format!(
                "Unknown LLM provider: '{}'. Valid options: groq, claude",
                s
            )),
        }
    }
}

/// Configuration for LLM clients.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// The LLM provider to use.
    pub provider: LlmProvider,
    /// Optional model override.
    pub model: Option<String>,
    /// Base URL of the chat completions API.
    pub base_url: Option<String>,
    /// API key for the chat completions API.
    pub api_key: Option<String>,
}

impl LlmConfig {
    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `ALIBOT_LLM_PROVIDER` - provider name (groq, claude)
    /// - `ALIBOT_LLM_MODEL` - model name
    /// - `ALIBOT_LLM_BASE_URL` - chat completions base URL
    /// - `GROQ_API` - API key
    pub fn from_env() -> Self {
        let provider = env::var("ALIBOT_LLM_PROVIDER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self {
            provider,
            model: env::var("ALIBOT_LLM_MODEL").ok(),
            base_url: env::var("ALIBOT_LLM_BASE_URL").ok(),
            api_key: env::var("GROQ_API").ok().filter(|k| !k.is_empty()),
        }
    }

    /// Merge with CLI overrides. CLI values take precedence.
    pub fn with_overrides(
        mut self,
        provider: Option<LlmProvider>,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Self {
        if let Some(p) = provider {
            self.provider = p;
        }
        if let Some(m) = model {
            self.model = Some(m);
        }
        if let Some(u) = base_url {
            self.base_url = Some(u);
        }
        self
    }

    /// Create an LLM client from this configuration.
    pub fn create_client(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        match self.provider {
            LlmProvider::Groq => {
                let api_key = self.api_key.clone().ok_or(LlmError::MissingApiKey)?;
                let mut client = ChatCompletionsClient::new(api_key);
                if let Some(ref model) = self.model {
                    client = client.with_model(model.clone());
                }
                if let Some(ref url) = self.base_url {
                    client = client.with_base_url(url.clone());
                }
                Ok(Arc::new(client))
            }
            LlmProvider::Claude => Ok(Arc::new(ClaudeCliClient {
                model: self.model.clone(),
            })),
        }
    }
}

/// Trait for LLM completion clients.
///
/// Implementations block; async callers run them on a blocking thread.
pub trait LlmClient: Send + Sync {
    /// Send a prompt to the LLM and return the completion response.
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Claude CLI client implementation.
pub struct ClaudeCliClient {
    pub model: Option<String>,
}

impl LlmClient for ClaudeCliClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        // Prompt goes over stdin; submitted code can exceed argv limits
        let mut args = vec!["--print"];
        if let Some(ref model) = self.model {
            args.push("--model");
            args.push(model);
        }

        let mut child = Command::new("claude")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmError::ClientError(format!("Failed to run claude CLI: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| LlmError::ClientError(format!("Failed to write to stdin: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| LlmError::ClientError(format!("Failed to wait for claude CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::ClientError(format!(
                "claude CLI failed: {}",
                stderr.trim()
            )));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Claude CLI stderr: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Errors from LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM client error: {0}")]
    ClientError(String),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No API key configured (set GROQ_API)")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
