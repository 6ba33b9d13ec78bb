//! OpenRouter backend (OpenAI-compatible chat completions)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::http_client::{DEFAULT_TIMEOUT_SECS, build_http_client};
use crate::llm::client::{BackendClient, BackendConfig, BackendResponse, Message};
use crate::llm::http_error::{code_to_string, response_to_error};

const PROVIDER: &str = "OpenRouter";
const APP_TITLE: &str = "Recall";
const APP_REFERER: &str = "http://localhost";

/// OpenRouter client
pub struct OpenRouterClient {
    client: Client,
}

impl OpenRouterClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    error: Option<ChatError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct ChatError {
    #[serde(default)]
    code: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl BackendClient for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn send(&self, history: &[Message], config: &BackendConfig) -> Result<BackendResponse> {
        let api_key = config.require_api_key(PROVIDER)?;
        let endpoint = config.require_endpoint(PROVIDER)?;
        let model = config.require_model(PROVIDER)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", endpoint))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .header("Content-Type", "application/json")
            .json(&ChatRequest {
                model,
                messages: history,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_to_error(response, PROVIDER).await);
        }

        let data: ChatResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(error) = data.error {
            return Err(AiError::provider(
                PROVIDER,
                code_to_string(&error.code),
                error.message.unwrap_or_default(),
            ));
        }

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty());

        Ok(BackendResponse {
            content,
            tokens_used: data.usage.and_then(|u| u.total_tokens),
            handle: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BackendConfig {
        BackendConfig {
            api_key: Some("or-key".to_string()),
            endpoint: Some(format!("{}/api/v1", server.uri())),
            model: Some("vendor/model".to_string()),
            api_version: None,
        }
    }

    #[tokio::test]
    async fn test_send_uses_bearer_and_reports_total_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("Authorization", "Bearer or-key"))
            .and(header("X-Title", "Recall"))
            .and(body_partial_json(json!({
                "model": "vendor/model",
                "messages": [{"role": "user", "content": "prompt"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "choices": [{"message": {"role": "assistant", "content": "done"}}],
                "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new().unwrap();
        let response = client
            .send(&[Message::user("prompt")], &config_for(&server))
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("done"));
        assert_eq!(response.tokens_used, Some(10));
        assert!(response.handle.is_none());
    }

    #[tokio::test]
    async fn test_error_payload_on_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 502, "message": "upstream unavailable"}
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new().unwrap();
        let err = client
            .send(&[Message::user("prompt")], &config_for(&server))
            .await
            .unwrap_err();

        match err {
            AiError::Provider { code, message, .. } => {
                assert_eq!(code, "502");
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_error_body_is_capped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("x".repeat(2000)))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new().unwrap();
        let err = client
            .send(&[Message::user("prompt")], &config_for(&server))
            .await
            .unwrap_err();

        match err {
            AiError::Http { status, body, .. } => {
                assert_eq!(status, 429);
                assert!(body.len() < 600);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_model_is_configuration_error() {
        let client = OpenRouterClient::new().unwrap();
        let config = BackendConfig {
            api_key: Some("k".to_string()),
            endpoint: Some("http://127.0.0.1:9".to_string()),
            model: None,
            api_version: None,
        };
        let err = client.send(&[Message::user("p")], &config).await.unwrap_err();
        assert!(err.is_configuration());
    }
}
