//! Response processor: turns backend replies into persisted memory records.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use recall_ai::ModeSource;

use super::parser::{ParsedObservation, ParsedSummary, parse_observations, parse_summary};
use crate::error::{RecallError, Result};
use crate::models::{MemoryRecord, ObservationRecord, SessionSnapshot, SummaryRecord};
use crate::storage::MemoryRecordStorage;

/// Length of the hash prefix used in record ids.
const ID_HASH_LEN: usize = 24;

/// Everything a processor learns about one reply
#[derive(Debug, Clone)]
pub struct ResponseContext<'a> {
    /// Identity of what was answered: the work item id, or a turn key for
    /// init/continuation replies. Redelivery of the same item reuses it.
    pub source_id: &'a str,
    pub text: &'a str,
    pub session: &'a SessionSnapshot,
    pub tokens_used: u64,
    /// Event time of the work item in epoch milliseconds
    pub original_timestamp: i64,
    pub backend: &'a str,
    pub cwd: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Ids of records written by this call
    pub created: Vec<String>,
    /// Ids of records that were already stored
    pub existing: Vec<String>,
}

impl ProcessOutcome {
    pub fn total(&self) -> usize {
        self.created.len() + self.existing.len()
    }
}

/// Consumer of backend replies. Must be idempotent: processing the same item
/// twice leaves the same persisted state as processing it once, even when the
/// backend words its second reply differently.
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    async fn process(&self, ctx: ResponseContext<'_>) -> Result<ProcessOutcome>;
}

/// Reply key for the init/continuation prompt of a user turn.
pub fn turn_source_id(prompt_number: u32) -> String {
    format!("turn-{prompt_number}")
}

/// Record identity: the n-th block of a kind extracted for one source.
fn record_key(memory_session_id: &str, source_id: &str, kind: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    for part in [memory_session_id, source_id, kind] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(index.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn content_hash(body: &impl Serialize) -> Result<String> {
    Ok(hex::encode(Sha256::digest(serde_json::to_vec(body)?)))
}

/// Stores parsed observations and summaries through [`MemoryRecordStorage`].
pub struct StoredResponseProcessor {
    records: MemoryRecordStorage,
    modes: Arc<dyn ModeSource>,
}

impl StoredResponseProcessor {
    pub fn new(records: MemoryRecordStorage, modes: Arc<dyn ModeSource>) -> Self {
        Self { records, modes }
    }

    fn observation_record(
        &self,
        ctx: &ResponseContext<'_>,
        memory_session_id: &str,
        index: usize,
        parsed: ParsedObservation,
    ) -> Result<MemoryRecord> {
        let key = record_key(memory_session_id, ctx.source_id, "observation", index);
        Ok(MemoryRecord::Observation(ObservationRecord {
            id: format!("obs-{}", &key[..ID_HASH_LEN]),
            content_hash: content_hash(&parsed)?,
            source_id: ctx.source_id.to_string(),
            memory_session_id: memory_session_id.to_string(),
            content_session_id: ctx.session.content_session_id.clone(),
            project: ctx.session.project.clone(),
            kind: parsed.kind,
            title: parsed.title,
            subtitle: parsed.subtitle,
            facts: parsed.facts,
            narrative: parsed.narrative,
            concepts: parsed.concepts,
            files_read: parsed.files_read,
            files_modified: parsed.files_modified,
            prompt_number: ctx.session.prompt_number,
            backend: ctx.backend.to_string(),
            cwd: ctx.cwd.map(str::to_string),
            discovery_tokens: ctx.tokens_used,
            created_at_epoch: ctx.original_timestamp,
        }))
    }

    fn summary_record(
        &self,
        ctx: &ResponseContext<'_>,
        memory_session_id: &str,
        parsed: ParsedSummary,
    ) -> Result<MemoryRecord> {
        let key = record_key(memory_session_id, ctx.source_id, "summary", 0);
        Ok(MemoryRecord::Summary(SummaryRecord {
            id: format!("sum-{}", &key[..ID_HASH_LEN]),
            content_hash: content_hash(&parsed)?,
            source_id: ctx.source_id.to_string(),
            memory_session_id: memory_session_id.to_string(),
            content_session_id: ctx.session.content_session_id.clone(),
            project: ctx.session.project.clone(),
            request: parsed.request,
            investigated: parsed.investigated,
            learned: parsed.learned,
            completed: parsed.completed,
            next_steps: parsed.next_steps,
            notes: parsed.notes,
            prompt_number: ctx.session.prompt_number,
            backend: ctx.backend.to_string(),
            discovery_tokens: ctx.tokens_used,
            created_at_epoch: ctx.original_timestamp,
        }))
    }
}

#[async_trait]
impl ResponseProcessor for StoredResponseProcessor {
    async fn process(&self, ctx: ResponseContext<'_>) -> Result<ProcessOutcome> {
        let memory_session_id = ctx.session.memory_session_id.as_deref().ok_or_else(|| {
            RecallError::precondition(format!(
                "session {} has no conversational handle",
                ctx.session.content_session_id
            ))
        })?;

        let mode = self.modes.active_mode();
        let mut records = Vec::new();
        for (index, parsed) in parse_observations(ctx.text, &mode).into_iter().enumerate() {
            records.push(self.observation_record(&ctx, memory_session_id, index, parsed)?);
        }
        if let Some(parsed) = parse_summary(ctx.text) {
            records.push(self.summary_record(&ctx, memory_session_id, parsed)?);
        }

        let mut outcome = ProcessOutcome::default();
        for record in &records {
            let result = self.records.put_if_not_exists(record)?;
            if result.is_created() {
                outcome.created.push(result.id().to_string());
            } else {
                outcome.existing.push(result.id().to_string());
            }
        }

        debug!(
            session_id = %ctx.session.content_session_id,
            backend = ctx.backend,
            created = outcome.created.len(),
            existing = outcome.existing.len(),
            "Processed backend reply"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActiveSession;
    use crate::storage::Storage;
    use recall_ai::StaticMode;
    use tempfile::tempdir;

    const REPLY: &str = "<observation><type>feature</type><title>Add pager</title>\
        <facts><fact>pages are 50 rows</fact></facts></observation>\
        <summary><request>Paging</request><completed>Pager added</completed></summary>";

    const REWORDED: &str = "<observation><type>feature</type><title>Added a pager</title>\
        <facts><fact>a page holds 50 rows</fact></facts></observation>\
        <summary><request>Paging</request><completed>The pager was added</completed></summary>";

    fn snapshot() -> SessionSnapshot {
        let mut session = ActiveSession::new("c1", "proj", "add paging", 1);
        session.bind_handle("claude-c1");
        session.snapshot()
    }

    fn context<'a>(session: &'a SessionSnapshot, timestamp: i64) -> ResponseContext<'a> {
        ResponseContext {
            source_id: "m1",
            text: REPLY,
            session,
            tokens_used: 42,
            original_timestamp: timestamp,
            backend: "claude",
            cwd: Some("/work"),
        }
    }

    #[tokio::test]
    async fn test_processing_twice_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let processor =
            StoredResponseProcessor::new(storage.records.clone(), Arc::new(StaticMode::default()));
        let session = snapshot();

        let first = processor.process(context(&session, 1_000)).await.unwrap();
        assert_eq!(first.created.len(), 2);
        assert!(first.existing.is_empty());

        // Redelivery may carry a different clock reading; the item decides identity.
        let second = processor.process(context(&session, 2_000)).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing, first.created);

        let records = storage.records.list_by_session("claude-c1").unwrap();
        assert_eq!(records.len(), 2);
        let observation = records
            .iter()
            .find_map(|r| match r {
                MemoryRecord::Observation(obs) => Some(obs),
                MemoryRecord::Summary(_) => None,
            })
            .unwrap();
        assert!(observation.id.starts_with("obs-"));
        assert_eq!(observation.kind, "feature");
        assert_eq!(observation.cwd.as_deref(), Some("/work"));
        assert_eq!(observation.discovery_tokens, 42);
        assert_eq!(observation.created_at_epoch, 1_000);
    }

    #[tokio::test]
    async fn test_missing_handle_is_precondition_failure() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let processor =
            StoredResponseProcessor::new(storage.records.clone(), Arc::new(StaticMode::default()));
        let session = ActiveSession::new("c1", "proj", "x", 1).snapshot();

        let err = processor.process(context(&session, 1)).await.unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_reworded_reply_to_same_item_is_absorbed() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let processor =
            StoredResponseProcessor::new(storage.records.clone(), Arc::new(StaticMode::default()));
        let session = snapshot();

        let first = processor.process(context(&session, 1_000)).await.unwrap();
        let second = processor
            .process(ResponseContext {
                text: REWORDED,
                ..context(&session, 1_000)
            })
            .await
            .unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing, first.created);

        // The stored text is the first reply's.
        let records = storage.records.list_by_session("claude-c1").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| matches!(
            r,
            MemoryRecord::Observation(obs) if obs.title.as_deref() == Some("Add pager")
        )));
        assert!(records.iter().all(|r| r.source_id() == "m1"));
    }

    #[tokio::test]
    async fn test_same_text_for_different_items_is_kept_per_item() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.db")).unwrap();
        let processor =
            StoredResponseProcessor::new(storage.records.clone(), Arc::new(StaticMode::default()));
        let session = snapshot();

        processor.process(context(&session, 1)).await.unwrap();
        let other = processor
            .process(ResponseContext {
                source_id: "m2",
                ..context(&session, 2)
            })
            .await
            .unwrap();
        assert_eq!(other.created.len(), 2);
        assert_eq!(storage.records.count_by_session("claude-c1").unwrap(), 4);
    }

    #[test]
    fn test_record_key_depends_on_every_part() {
        let a = record_key("s1", "m1", "observation", 0);
        assert_eq!(a, record_key("s1", "m1", "observation", 0));
        assert_ne!(a, record_key("s2", "m1", "observation", 0));
        assert_ne!(a, record_key("s1", "m2", "observation", 0));
        assert_ne!(a, record_key("s1", "m1", "summary", 0));
        assert_ne!(a, record_key("s1", "m1", "observation", 1));
        assert_eq!(a.len(), 64);
        assert_eq!(turn_source_id(3), "turn-3");
    }
}
