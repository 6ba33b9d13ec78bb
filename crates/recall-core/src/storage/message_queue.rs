//! Typed work queue over recall-storage::MessageQueue.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::models::{PendingMessage, WorkItem};

#[derive(Clone)]
pub struct MessageQueueStorage {
    inner: recall_storage::MessageQueue,
}

impl MessageQueueStorage {
    pub fn new(inner: recall_storage::MessageQueue) -> Self {
        Self { inner }
    }

    /// Queue a new item under a fresh id.
    pub fn enqueue(&self, session_id: &str, item: WorkItem) -> Result<PendingMessage> {
        let message = PendingMessage::new(session_id, item);
        self.enqueue_message(&message)?;
        Ok(message)
    }

    /// Queue a message with a caller-chosen id. Returns false if the id is
    /// already queued or being processed.
    pub fn enqueue_message(&self, message: &PendingMessage) -> Result<bool> {
        let bytes = serde_json::to_vec(message)?;
        self.inner
            .enqueue(&message.session_id, &message.id, &bytes)
    }

    /// Claim the oldest pending message of a session.
    pub fn claim_next(&self, session_id: &str) -> Result<Option<PendingMessage>> {
        match self.inner.claim_next(session_id)? {
            Some(claimed) => {
                let message: PendingMessage = serde_json::from_slice(&claimed.data)
                    .with_context(|| format!("Corrupt queue entry {}", claimed.message_id))?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    pub fn ack(&self, message_id: &str) -> Result<bool> {
        self.inner.ack(message_id)
    }

    pub fn requeue(&self, message_id: &str) -> Result<bool> {
        self.inner.requeue(message_id)
    }

    pub fn recover_processing(&self) -> Result<usize> {
        self.inner.recover_processing()
    }

    pub fn pending_count(&self, session_id: &str) -> Result<usize> {
        self.inner.pending_count(session_id)
    }

    pub fn processing_count(&self, session_id: &str) -> Result<usize> {
        self.inner.processing_count(session_id)
    }

    pub fn sessions_with_pending(&self) -> Result<Vec<String>> {
        self.inner.sessions_with_pending()
    }

    pub fn clear_session(&self, session_id: &str) -> Result<usize> {
        self.inner.clear_session(session_id)
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.inner.notifier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_ai::{ObservationInput, SummaryInput};
    use redb::Database;
    use tempfile::tempdir;

    fn setup() -> (MessageQueueStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        let queue = MessageQueueStorage::new(recall_storage::MessageQueue::new(db).unwrap());
        (queue, temp_dir)
    }

    fn observation(tool: &str) -> WorkItem {
        WorkItem::Observation(ObservationInput {
            tool_name: tool.to_string(),
            tool_input: "{}".to_string(),
            tool_response: "ok".to_string(),
            cwd: None,
            created_at_epoch: 1,
            prompt_number: None,
        })
    }

    #[test]
    fn test_typed_roundtrip_in_order() {
        let (queue, _temp_dir) = setup();

        let first = queue.enqueue("s1", observation("Read")).unwrap();
        let second = queue
            .enqueue("s1", WorkItem::Summarize(SummaryInput::default()))
            .unwrap();

        let claimed = queue.claim_next("s1").unwrap().unwrap();
        assert_eq!(claimed, first);
        queue.ack(&claimed.id).unwrap();

        let claimed = queue.claim_next("s1").unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert_eq!(claimed.item.kind(), "summarize");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (queue, _temp_dir) = setup();
        let message = PendingMessage::with_id("fixed", "s1", observation("Edit"));
        assert!(queue.enqueue_message(&message).unwrap());
        assert!(!queue.enqueue_message(&message).unwrap());
        assert_eq!(queue.pending_count("s1").unwrap(), 1);
    }
}
