use std::collections::HashSet;

use chrono::{DateTime, Utc};
use recall_ai::ConversationHistory;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle of a session's capture conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// A prompt was sent but no reply has bound the handle yet.
    AwaitingFirstReply,
    /// Handle bound; items are being drained.
    Active,
    Completed,
    Failed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::AwaitingFirstReply => "awaiting_first_reply",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed)
    }
}

/// One coding-assistant conversation being captured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub content_session_id: String,
    /// Conversational handle; set at most once.
    memory_session_id: Option<String>,
    pub project: String,
    pub user_prompt: String,
    prompt_number: u32,
    /// Highest prompt number an init/continuation prompt was sent for.
    pub last_prompted_number: u32,
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    #[serde(default)]
    pub processed_message_ids: HashSet<String>,
    #[serde(default)]
    pub history: ConversationHistory,
}

impl ActiveSession {
    pub fn new(
        content_session_id: impl Into<String>,
        project: impl Into<String>,
        user_prompt: impl Into<String>,
        prompt_number: u32,
    ) -> Self {
        Self {
            content_session_id: content_session_id.into(),
            memory_session_id: None,
            project: project.into(),
            user_prompt: user_prompt.into(),
            prompt_number,
            last_prompted_number: 0,
            cumulative_input_tokens: 0,
            cumulative_output_tokens: 0,
            started_at: Utc::now(),
            state: SessionState::Uninitialized,
            processed_message_ids: HashSet::new(),
            history: ConversationHistory::new(),
        }
    }

    pub fn memory_session_id(&self) -> Option<&str> {
        self.memory_session_id.as_deref()
    }

    pub fn prompt_number(&self) -> u32 {
        self.prompt_number
    }

    /// Bind the conversational handle. Returns false if one is already bound.
    pub fn bind_handle(&mut self, handle: impl Into<String>) -> bool {
        let handle = handle.into();
        if let Some(existing) = &self.memory_session_id {
            if *existing != handle {
                warn!(
                    session_id = %self.content_session_id,
                    existing = %existing,
                    ignored = %handle,
                    "Conversational handle already bound"
                );
            }
            return false;
        }
        self.memory_session_id = Some(handle);
        true
    }

    /// Record a new user turn. Older prompt numbers are ignored.
    pub fn observe_prompt(&mut self, user_prompt: impl Into<String>, prompt_number: u32) -> bool {
        if prompt_number < self.prompt_number {
            return false;
        }
        if prompt_number > self.prompt_number || self.user_prompt.is_empty() {
            self.user_prompt = user_prompt.into();
        }
        self.prompt_number = prompt_number;
        true
    }

    /// Whether the current user turn still needs its init/continuation prompt.
    pub fn needs_turn_prompt(&self) -> bool {
        self.prompt_number > self.last_prompted_number && !self.user_prompt.trim().is_empty()
    }

    pub fn add_tokens(&mut self, input: u64, output: u64) {
        self.cumulative_input_tokens += input;
        self.cumulative_output_tokens += output;
    }

    /// State to continue from after a pass that did not end in `Active`.
    pub fn resume(&mut self) {
        if matches!(
            self.state,
            SessionState::Failed | SessionState::Aborted | SessionState::Completed
        ) {
            self.state = if self.memory_session_id.is_some() {
                SessionState::Active
            } else {
                SessionState::Uninitialized
            };
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            content_session_id: self.content_session_id.clone(),
            memory_session_id: self.memory_session_id.clone(),
            project: self.project.clone(),
            user_prompt: self.user_prompt.clone(),
            prompt_number: self.prompt_number,
            cumulative_input_tokens: self.cumulative_input_tokens,
            cumulative_output_tokens: self.cumulative_output_tokens,
            started_at: self.started_at,
            state: self.state,
            history_len: self.history.len(),
        }
    }
}

/// Read-only view of a session handed to collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub content_session_id: String,
    pub memory_session_id: Option<String>,
    pub project: String,
    pub user_prompt: String,
    pub prompt_number: u32,
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
    pub history_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_bound_once() {
        let mut session = ActiveSession::new("c1", "proj", "hello", 1);
        assert!(session.bind_handle("h1"));
        assert!(!session.bind_handle("h2"));
        assert_eq!(session.memory_session_id(), Some("h1"));
    }

    #[test]
    fn test_prompt_number_is_monotonic() {
        let mut session = ActiveSession::new("c1", "proj", "first", 2);
        assert!(!session.observe_prompt("older", 1));
        assert_eq!(session.prompt_number(), 2);
        assert_eq!(session.user_prompt, "first");

        assert!(session.observe_prompt("third", 3));
        assert_eq!(session.prompt_number(), 3);
        assert_eq!(session.user_prompt, "third");
    }

    #[test]
    fn test_needs_turn_prompt() {
        let mut session = ActiveSession::new("c1", "proj", "hello", 1);
        assert!(session.needs_turn_prompt());
        session.last_prompted_number = 1;
        assert!(!session.needs_turn_prompt());

        let idle = ActiveSession::new("c2", "proj", "", 0);
        assert!(!idle.needs_turn_prompt());
    }

    #[test]
    fn test_resume_after_failure() {
        let mut session = ActiveSession::new("c1", "proj", "hello", 1);
        session.state = SessionState::Failed;
        session.resume();
        assert_eq!(session.state, SessionState::Uninitialized);

        session.bind_handle("h");
        session.state = SessionState::Aborted;
        session.resume();
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn test_serde_roundtrip_keeps_handle_and_history() {
        let mut session = ActiveSession::new("c1", "proj", "hello", 1);
        session.bind_handle("h");
        session.history.push_user("p");
        session.processed_message_ids.insert("m1".to_string());

        let bytes = serde_json::to_vec(&session).unwrap();
        let restored: ActiveSession = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.memory_session_id(), Some("h"));
        assert_eq!(restored.history.len(), 1);
        assert!(restored.processed_message_ids.contains("m1"));
    }
}
