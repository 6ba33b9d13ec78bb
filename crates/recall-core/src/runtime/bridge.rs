//! Host event boundary.
//!
//! Memory capture must never break the host's own interaction, so every
//! handler here logs and discards errors and reports the outcome as a plain
//! value. Nothing below this layer swallows failures.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use recall_ai::{ObservationInput, SummaryInput};

use super::manager::SessionManager;
use super::orchestrator::PassReport;
use crate::models::PendingMessage;

/// A tool invocation as reported by the host.
#[derive(Debug, Clone)]
pub struct ToolUseEvent {
    pub tool_name: String,
    pub tool_input: String,
    pub tool_response: String,
    pub cwd: Option<String>,
    pub prompt_number: Option<u32>,
}

#[derive(Clone)]
pub struct EventBridge {
    manager: Arc<SessionManager>,
}

impl EventBridge {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Returns whether the turn was recorded.
    pub async fn on_user_prompt(
        &self,
        session_id: &str,
        project: &str,
        prompt: &str,
        prompt_number: u32,
    ) -> bool {
        match self
            .manager
            .init_session(session_id, project, prompt, prompt_number)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(session_id, error = %err, "Failed to record user prompt");
                false
            }
        }
    }

    pub async fn on_tool_use(&self, session_id: &str, event: ToolUseEvent) -> Option<PendingMessage> {
        let input = ObservationInput {
            tool_name: event.tool_name,
            tool_input: event.tool_input,
            tool_response: event.tool_response,
            cwd: event.cwd,
            created_at_epoch: Utc::now().timestamp_millis(),
            prompt_number: event.prompt_number,
        };
        match self.manager.queue_observation(session_id, input).await {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(session_id, error = %err, "Failed to queue observation");
                None
            }
        }
    }

    pub async fn on_stop(
        &self,
        session_id: &str,
        last_assistant_message: Option<String>,
    ) -> Option<PendingMessage> {
        let input = SummaryInput {
            last_assistant_message,
        };
        match self.manager.queue_summarize(session_id, input).await {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(session_id, error = %err, "Failed to queue summary");
                None
            }
        }
    }

    /// Returns whether a live session was completed.
    pub async fn on_session_end(&self, session_id: &str) -> bool {
        match self.manager.complete(session_id).await {
            Ok(completed) => completed,
            Err(err) => {
                warn!(session_id, error = %err, "Failed to complete session");
                false
            }
        }
    }

    /// Wait for the session's pass. `None` when no pass ran or it failed.
    pub async fn settle(&self, session_id: &str) -> Option<PassReport> {
        match self.manager.wait_idle(session_id).await {
            Ok(report) => report,
            Err(err) => {
                warn!(session_id, kind = err.kind(), error = %err, "Memory capture pass failed");
                None
            }
        }
    }
}
