//! Backend client trait and shared types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};

/// Conversation role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation history entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Connection settings handed to a backend on every call.
///
/// All fields are optional here; each client decides which ones it needs and
/// fails with [`AiError::Configuration`] before any I/O when one is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
}

fn required<'a>(value: &'a Option<String>, provider: &str, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AiError::configuration(provider, format!("missing {}", field))),
    }
}

impl BackendConfig {
    pub fn require_api_key(&self, provider: &str) -> Result<&str> {
        required(&self.api_key, provider, "api key")
    }

    /// Endpoint without a trailing slash.
    pub fn require_endpoint(&self, provider: &str) -> Result<&str> {
        required(&self.endpoint, provider, "endpoint").map(|e| e.trim_end_matches('/'))
    }

    pub fn require_model(&self, provider: &str) -> Result<&str> {
        required(&self.model, provider, "model")
    }

    pub fn require_api_version(&self, provider: &str) -> Result<&str> {
        required(&self.api_version, provider, "api version")
    }
}

/// Result of one backend call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendResponse {
    /// Extracted text; `None` when the backend produced no text.
    pub content: Option<String>,
    /// Total tokens reported by the backend, if any.
    pub tokens_used: Option<u64>,
    /// Conversational handle assigned by a stateful backend.
    pub handle: Option<String>,
}

impl BackendResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// True when there is no non-whitespace text to append.
    pub fn is_empty(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true)
    }
}

/// Extraction backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Backend identity used in logs and records
    fn name(&self) -> &str;

    /// Send the full conversation and return the reply.
    async fn send(&self, history: &[Message], config: &BackendConfig) -> Result<BackendResponse>;
}
