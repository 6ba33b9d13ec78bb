use serde::{Deserialize, Serialize};

/// Structured observation extracted from a backend reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: String,
    pub content_hash: String,
    /// Work item (or user turn) the record was extracted for
    #[serde(default)]
    pub source_id: String,
    pub memory_session_id: String,
    pub content_session_id: String,
    pub project: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    pub narrative: Option<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    pub prompt_number: u32,
    pub backend: String,
    pub cwd: Option<String>,
    pub discovery_tokens: u64,
    pub created_at_epoch: i64,
}

/// Session summary extracted from a backend reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub content_hash: String,
    #[serde(default)]
    pub source_id: String,
    pub memory_session_id: String,
    pub content_session_id: String,
    pub project: String,
    pub request: Option<String>,
    pub investigated: Option<String>,
    pub learned: Option<String>,
    pub completed: Option<String>,
    pub next_steps: Option<String>,
    pub notes: Option<String>,
    pub prompt_number: u32,
    pub backend: String,
    pub discovery_tokens: u64,
    pub created_at_epoch: i64,
}

/// Anything persisted by the response processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum MemoryRecord {
    Observation(ObservationRecord),
    Summary(SummaryRecord),
}

impl MemoryRecord {
    pub fn id(&self) -> &str {
        match self {
            MemoryRecord::Observation(r) => &r.id,
            MemoryRecord::Summary(r) => &r.id,
        }
    }

    pub fn content_hash(&self) -> &str {
        match self {
            MemoryRecord::Observation(r) => &r.content_hash,
            MemoryRecord::Summary(r) => &r.content_hash,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            MemoryRecord::Observation(r) => &r.source_id,
            MemoryRecord::Summary(r) => &r.source_id,
        }
    }

    pub fn memory_session_id(&self) -> &str {
        match self {
            MemoryRecord::Observation(r) => &r.memory_session_id,
            MemoryRecord::Summary(r) => &r.memory_session_id,
        }
    }

    pub fn created_at_epoch(&self) -> i64 {
        match self {
            MemoryRecord::Observation(r) => r.created_at_epoch,
            MemoryRecord::Summary(r) => r.created_at_epoch,
        }
    }
}
