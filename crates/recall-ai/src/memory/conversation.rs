//! Conversation history with budgeted, non-destructive truncation.
//!
//! The history is the authoritative record of a session's turns. Budgets are
//! applied per request: [`ConversationHistory::truncated`] returns the newest
//! suffix that fits and leaves the history untouched, so a backend with a
//! larger budget can still see older entries.
//!
//! ```
//! use recall_ai::Role;
//! use recall_ai::memory::{ConversationHistory, TruncationPolicy};
//!
//! let mut history = ConversationHistory::new();
//! history.push_user("a".repeat(400));
//! history.push_assistant("b".repeat(400));
//! history.push_user("c".repeat(40));
//! history.push_assistant("d".repeat(40));
//! history.push_user("e".repeat(40));
//!
//! // The newest four entries fit, but the cut would open on a reply.
//! let payload = history.truncated(&TruncationPolicy::new(150));
//! assert_eq!(payload.messages.len(), 3);
//! assert_eq!(payload.messages[0].role, Role::User);
//! assert_eq!(history.len(), 5);
//! ```

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// Fixed character-to-token ratio used for estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated tokens for a piece of text, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Budget for one outgoing payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationPolicy {
    pub max_tokens: usize,
    #[serde(default)]
    pub max_messages: Option<usize>,
}

impl TruncationPolicy {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            max_messages: None,
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }
}

/// What a truncation removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationReport {
    pub original: usize,
    pub kept: usize,
    pub dropped: usize,
    pub estimated_tokens: usize,
}

/// Payload produced for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedHistory {
    pub messages: Vec<Message>,
    /// Present only when entries were dropped.
    pub report: Option<TruncationReport>,
}

/// Ordered, append-only log of role-tagged entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Remove the newest entry if it is a user entry still waiting for a reply.
    pub fn pop_unanswered_user(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(last) if last.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }

    /// Newest suffix of the history that fits `policy`.
    ///
    /// Walks from the newest entry backward and stops before the first entry
    /// that would exceed either limit. Entries are never split. A payload
    /// never opens with an assistant entry, since providers reject that; such
    /// leading replies are dropped with the older entries. The newest entry is
    /// always included, even when it alone exceeds the token budget.
    pub fn truncated(&self, policy: &TruncationPolicy) -> TruncatedHistory {
        let original = self.messages.len();
        let max_messages = policy.max_messages.unwrap_or(usize::MAX).max(1);

        let mut kept = 0;
        let mut tokens = 0;
        for message in self.messages.iter().rev() {
            let cost = estimate_tokens(&message.content);
            if kept > 0 && (kept >= max_messages || tokens + cost > policy.max_tokens) {
                break;
            }
            kept += 1;
            tokens += cost;
        }
        while kept > 1 && self.messages[original - kept].role == Role::Assistant {
            tokens -= estimate_tokens(&self.messages[original - kept].content);
            kept -= 1;
        }

        let messages = self.messages[original - kept..].to_vec();
        let report = (kept < original).then_some(TruncationReport {
            original,
            kept,
            dropped: original - kept,
            estimated_tokens: tokens,
        });

        TruncatedHistory { messages, report }
    }
}
