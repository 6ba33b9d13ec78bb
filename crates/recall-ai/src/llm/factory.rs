//! Backend factory for config-driven chains

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::http_client::DEFAULT_TIMEOUT_SECS;
use crate::llm::{BackendClient, BackendConfig, ClaudeClient, GeminiClient, OpenRouterClient};

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Claude,
    Gemini,
    OpenRouter,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Claude => "https://api.anthropic.com",
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Claude => "claude-sonnet-4-20250514",
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenRouter => "anthropic/claude-3.5-haiku",
        }
    }

    pub fn default_api_version(&self) -> Option<&'static str> {
        match self {
            Self::Claude => Some("2023-06-01"),
            Self::Gemini => Some("v1beta"),
            Self::OpenRouter => None,
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Default context ceiling in estimated tokens.
    pub fn default_max_context_tokens(&self) -> usize {
        match self {
            Self::Claude => 150_000,
            Self::Gemini => 100_000,
            Self::OpenRouter => 100_000,
        }
    }

    /// Fill every unset field of `config` with this backend's default.
    pub fn with_defaults(&self, mut config: BackendConfig) -> BackendConfig {
        config.endpoint.get_or_insert_with(|| self.default_endpoint().to_string());
        config.model.get_or_insert_with(|| self.default_model().to_string());
        if config.api_version.is_none() {
            config.api_version = self.default_api_version().map(str::to_string);
        }
        config
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            other => Err(AiError::configuration(other, "unknown backend kind")),
        }
    }
}

/// Client construction options that are not part of per-call config
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub timeout_secs: Option<u64>,
    pub requests_per_minute: Option<u32>,
}

pub fn create_backend(kind: BackendKind, options: &ClientOptions) -> Result<Arc<dyn BackendClient>> {
    let timeout = Duration::from_secs(options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let client: Arc<dyn BackendClient> = match kind {
        BackendKind::Claude => Arc::new(ClaudeClient::with_timeout(timeout)?),
        BackendKind::Gemini => {
            let client = GeminiClient::with_timeout(timeout)?;
            match options.requests_per_minute {
                Some(rpm) => Arc::new(client.with_requests_per_minute(rpm)),
                None => Arc::new(client),
            }
        }
        BackendKind::OpenRouter => Arc::new(OpenRouterClient::with_timeout(timeout)?),
    };
    Ok(client)
}
