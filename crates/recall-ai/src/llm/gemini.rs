//! Gemini backend (generateContent REST API)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AiError, Result};
use crate::http_client::{DEFAULT_TIMEOUT_SECS, build_http_client};
use crate::llm::client::{BackendClient, BackendConfig, BackendResponse, Message, Role};
use crate::llm::http_error::{code_to_string, response_to_error};

const PROVIDER: &str = "Gemini";

/// Gemini client with optional request pacing
pub struct GeminiClient {
    client: Client,
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl GeminiClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            min_interval: None,
            last_request: Mutex::new(None),
        })
    }

    /// Space requests so at most `rpm` are sent per minute. Zero disables pacing.
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.min_interval = (rpm > 0).then(|| Duration::from_millis(60_000 / rpm as u64));
        self
    }

    /// Wait until the pacing interval since the previous request has elapsed.
    async fn pace(&self) {
        let Some(interval) = self.min_interval else {
            return;
        };

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "Pacing Gemini request");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    total_token_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn to_wire(history: &[Message]) -> Vec<GeminiContent> {
    history
        .iter()
        .map(|m| GeminiContent {
            role: Some(
                match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }
                .to_string(),
            ),
            parts: vec![GeminiPart {
                text: Some(m.content.clone()),
            }],
        })
        .collect()
}

#[async_trait]
impl BackendClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, history: &[Message], config: &BackendConfig) -> Result<BackendResponse> {
        let api_key = config.require_api_key(PROVIDER)?;
        let endpoint = config.require_endpoint(PROVIDER)?;
        let model = config.require_model(PROVIDER)?;
        let api_version = config.require_api_version(PROVIDER)?;

        self.pace().await;

        let url = format!("{}/{}/models/{}:generateContent", endpoint, api_version, model);
        let response = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .json(&GeminiRequest {
                contents: to_wire(history),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_to_error(response, PROVIDER).await);
        }

        let data: GeminiResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(error) = data.error {
            let code = error.status.unwrap_or_else(|| code_to_string(&error.code));
            return Err(AiError::provider(PROVIDER, code, error.message.unwrap_or_default()));
        }

        if let Some(reason) = data.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AiError::provider(
                PROVIDER,
                "BLOCKED",
                format!("prompt blocked: {}", reason),
            ));
        }

        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(BackendResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tokens_used: data.usage_metadata.and_then(|u| u.total_token_count),
            handle: None,
        })
    }
}
