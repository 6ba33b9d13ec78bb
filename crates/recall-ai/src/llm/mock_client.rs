//! Deterministic mock backend for orchestration tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};

use super::{BackendClient, BackendConfig, BackendResponse, Message, Role};

/// Scripted outcome of one call.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    Reply(BackendResponse),
    Http { status: u16, body: String },
    Provider { code: String, message: String },
    Configuration(String),
}

/// Scripted call with optional delay before it resolves.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self::reply(BackendResponse::text(content))
    }

    pub fn reply(response: BackendResponse) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Reply(response),
        }
    }

    pub fn empty() -> Self {
        Self::reply(BackendResponse::default())
    }

    pub fn http_error(status: u16, body: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Http {
                status,
                body: body.into(),
            },
        }
    }

    pub fn provider_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Provider {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Configuration(message.into()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A backend that replays scripted steps and records every payload.
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_steps(name, Vec::new())
    }

    pub fn from_steps(name: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            name: name.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    /// Payloads received so far, oldest call first.
    pub async fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Reply used when the script has run out.
    fn echo(history: &[Message]) -> BackendResponse {
        let text = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| format!("mock-echo: {}", m.content))
            .unwrap_or_else(|| "mock-ok".to_string());
        BackendResponse::text(text)
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, history: &[Message], _config: &BackendConfig) -> Result<BackendResponse> {
        self.calls.lock().await.push(history.to_vec());

        let step = self.script.lock().await.pop_front();
        let Some(step) = step else {
            return Ok(Self::echo(history));
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Reply(response) => Ok(response),
            MockStepKind::Http { status, body } => Err(AiError::Http {
                provider: self.name.clone(),
                status,
                body,
            }),
            MockStepKind::Provider { code, message } => {
                Err(AiError::provider(self.name.clone(), code, message))
            }
            MockStepKind::Configuration(message) => {
                Err(AiError::configuration(self.name.clone(), message))
            }
        }
    }
}
