use chrono::{DateTime, Utc};
use recall_ai::{ObservationInput, SummaryInput};
use serde::{Deserialize, Serialize};

/// Unit of capture input queued for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkItem {
    Observation(ObservationInput),
    Summarize(SummaryInput),
}

impl WorkItem {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkItem::Observation(_) => "observation",
            WorkItem::Summarize(_) => "summarize",
        }
    }

    /// When the underlying event happened, if known.
    pub fn created_at_epoch(&self) -> Option<i64> {
        match self {
            WorkItem::Observation(input) => Some(input.created_at_epoch),
            WorkItem::Summarize(_) => None,
        }
    }

    pub fn cwd(&self) -> Option<&str> {
        match self {
            WorkItem::Observation(input) => input.cwd.as_deref(),
            WorkItem::Summarize(_) => None,
        }
    }

    pub fn prompt_number(&self) -> Option<u32> {
        match self {
            WorkItem::Observation(input) => input.prompt_number,
            WorkItem::Summarize(_) => None,
        }
    }
}

/// A queued work item with its persistent identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub id: String,
    pub session_id: String,
    pub item: WorkItem,
    pub enqueued_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(session_id: impl Into<String>, item: WorkItem) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), session_id, item)
    }

    pub fn with_id(id: impl Into<String>, session_id: impl Into<String>, item: WorkItem) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            item,
            enqueued_at: Utc::now(),
        }
    }

    /// Event time of the item, falling back to when it was queued.
    pub fn original_timestamp(&self) -> i64 {
        self.item
            .created_at_epoch()
            .unwrap_or_else(|| self.enqueued_at.timestamp_millis())
    }
}
