//! Claude backend (Anthropic Messages API)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, Result};
use crate::http_client::{DEFAULT_TIMEOUT_SECS, build_http_client};
use crate::llm::client::{BackendClient, BackendConfig, BackendResponse, Message, Role};
use crate::llm::http_error::response_to_error;

const PROVIDER: &str = "Claude";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Claude client
pub struct ClaudeClient {
    client: Client,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
    #[serde(default)]
    error: Option<ClaudeError>,
}

#[derive(Deserialize)]
struct ClaudeContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ClaudeError {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Merge consecutive entries of the same role; the Messages API expects turns
/// to alternate.
fn to_wire(history: &[Message]) -> Vec<ClaudeMessage> {
    let mut out: Vec<ClaudeMessage> = Vec::with_capacity(history.len());
    for m in history {
        let role = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        match out.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&m.content);
            }
            _ => out.push(ClaudeMessage {
                role,
                content: m.content.clone(),
            }),
        }
    }
    out
}

#[async_trait]
impl BackendClient for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    async fn send(&self, history: &[Message], config: &BackendConfig) -> Result<BackendResponse> {
        let api_key = config.require_api_key(PROVIDER)?;
        let endpoint = config.require_endpoint(PROVIDER)?;
        let model = config.require_model(PROVIDER)?;
        let api_version = config.require_api_version(PROVIDER)?;

        let body = ClaudeRequest {
            model,
            max_tokens: self.max_tokens,
            messages: to_wire(history),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", api_version)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(response_to_error(response, PROVIDER).await);
        }

        let data: ClaudeResponse = serde_json::from_str(&response.text().await?)?;

        if let Some(error) = data.error {
            return Err(AiError::provider(
                PROVIDER,
                error.r#type.unwrap_or_else(|| "error".to_string()),
                error.message.unwrap_or_default(),
            ));
        }

        let text: String = data
            .content
            .iter()
            .filter(|block| block.r#type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(BackendResponse {
            content: if text.is_empty() { None } else { Some(text) },
            tokens_used: data.usage.map(|u| u.input_tokens + u.output_tokens),
            handle: data.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> BackendConfig {
        BackendConfig {
            api_key: Some("test-key".to_string()),
            endpoint: Some(server.uri()),
            model: Some("claude-test".to_string()),
            api_version: Some("2023-06-01".to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_returns_text_usage_and_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_123",
                "type": "message",
                "content": [
                    {"type": "text", "text": "<observation>"},
                    {"type": "text", "text": "</observation>"}
                ],
                "usage": {"input_tokens": 60, "output_tokens": 40}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ClaudeClient::new().unwrap();
        let response = client
            .send(&[Message::user("hello")], &config_for(&server))
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("<observation></observation>"));
        assert_eq!(response.tokens_used, Some(100));
        assert_eq!(response.handle.as_deref(), Some("msg_123"));
    }

    #[tokio::test]
    async fn test_non_success_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .mount(&server)
            .await;

        let client = ClaudeClient::new().unwrap();
        let err = client
            .send(&[Message::user("hello")], &config_for(&server))
            .await
            .unwrap_err();

        match err {
            AiError::Http { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "internal");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.api_key = None;

        let client = ClaudeClient::new().unwrap();
        let err = client.send(&[Message::user("hello")], &config).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_no_text_and_no_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_empty",
                "content": []
            })))
            .mount(&server)
            .await;

        let client = ClaudeClient::new().unwrap();
        let response = client
            .send(&[Message::user("hello")], &config_for(&server))
            .await
            .unwrap();

        assert!(response.content.is_none());
        assert!(response.tokens_used.is_none());
    }

    #[test]
    fn test_consecutive_roles_are_merged() {
        let history = vec![
            Message::user("a"),
            Message::user("b"),
            Message::assistant("c"),
        ];
        let wire = to_wire(&history);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].content, "a\n\nb");
        assert_eq!(wire[1].role, "assistant");
    }

    #[test]
    fn test_truncated_history_opens_with_user_turn() {
        let mut history = crate::memory::ConversationHistory::new();
        history.push_user("u".repeat(400));
        history.push_assistant("a".repeat(40));
        history.push_user("n".repeat(40));

        let payload = history.truncated(&crate::memory::TruncationPolicy::new(50));
        let roles: Vec<&str> = to_wire(&payload.messages).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user"]);
    }
}
