//! Message queue storage - per-session FIFO of pending work items.
//!
//! Uses separate tables for pending/processing so claiming the next item of a
//! session is a single range lookup. Both tables share the composite key
//! "{session_id}:{seq:020}", where `seq` is a global counter assigned inside
//! the enqueue transaction, so keys of one session sort in arrival order and
//! an item keeps its position when it is moved back to pending.

use anyhow::{Result, anyhow};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use crate::range_utils::prefix_range;

const PENDING: TableDefinition<&str, &[u8]> = TableDefinition::new("queue_pending");
const PROCESSING: TableDefinition<&str, &[u8]> = TableDefinition::new("queue_processing");
/// Index: message_id -> queue key
const MESSAGE_KEYS: TableDefinition<&str, &str> = TableDefinition::new("queue_message_keys");
/// Index: queue key -> message_id
const KEY_MESSAGES: TableDefinition<&str, &str> = TableDefinition::new("queue_key_messages");
const META: TableDefinition<&str, u64> = TableDefinition::new("queue_meta");

const NEXT_SEQ: &str = "next_seq";

/// A message moved from pending to processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedMessage {
    pub message_id: String,
    pub data: Vec<u8>,
}

/// Pure storage layer for the work queue - only handles data persistence
#[derive(Clone)]
pub struct MessageQueue {
    db: Arc<Database>,
    notify: Arc<Notify>,
}

fn queue_key(session_id: &str, seq: u64) -> String {
    format!("{}:{:020}", session_id, seq)
}

/// Session part of a composite key. Session ids may themselves contain ':'.
fn key_session(key: &str) -> Option<&str> {
    key.rsplit_once(':').map(|(session, _)| session)
}

impl MessageQueue {
    /// Create a new message queue instance
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(PENDING)?;
        write_txn.open_table(PROCESSING)?;
        write_txn.open_table(MESSAGE_KEYS)?;
        write_txn.open_table(KEY_MESSAGES)?;
        write_txn.open_table(META)?;
        write_txn.commit()?;

        Ok(Self {
            db,
            notify: Arc::new(Notify::new()),
        })
    }

    /// Handle used by consumers to wait for new messages.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Append a message to the session's pending queue.
    ///
    /// Returns `false` without writing anything when `message_id` is already
    /// queued or being processed.
    pub fn enqueue(&self, session_id: &str, message_id: &str, data: &[u8]) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut message_keys = write_txn.open_table(MESSAGE_KEYS)?;
            if message_keys.get(message_id)?.is_some() {
                false
            } else {
                let mut meta = write_txn.open_table(META)?;
                let seq = meta.get(NEXT_SEQ)?.map(|v| v.value()).unwrap_or(0);
                meta.insert(NEXT_SEQ, seq + 1)?;

                let key = queue_key(session_id, seq);
                let mut pending = write_txn.open_table(PENDING)?;
                pending.insert(key.as_str(), data)?;
                message_keys.insert(message_id, key.as_str())?;
                let mut key_messages = write_txn.open_table(KEY_MESSAGES)?;
                key_messages.insert(key.as_str(), message_id)?;
                true
            }
        };

        if inserted {
            write_txn.commit()?;
            self.notify.notify_waiters();
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    /// Atomically move the oldest pending message of a session to processing.
    pub fn claim_next(&self, session_id: &str) -> Result<Option<ClaimedMessage>> {
        let write_txn = self.db.begin_write()?;

        let claimed = {
            let mut pending = write_txn.open_table(PENDING)?;

            let first_entry = {
                let (start, end) = prefix_range(&format!("{}:", session_id));
                let mut found = None;
                for item in pending.range(start.as_str()..end.as_str())? {
                    let (key, value) = item?;
                    if key_session(key.value()) == Some(session_id) {
                        found = Some((key.value().to_string(), value.value().to_vec()));
                        break;
                    }
                }
                found
            };

            if let Some((key, data)) = first_entry {
                pending.remove(key.as_str())?;

                let mut processing = write_txn.open_table(PROCESSING)?;
                processing.insert(key.as_str(), data.as_slice())?;

                let key_messages = write_txn.open_table(KEY_MESSAGES)?;
                let message_id = key_messages
                    .get(key.as_str())?
                    .map(|v| v.value().to_string())
                    .ok_or_else(|| anyhow!("Queue key without message id: {}", key))?;

                Some(ClaimedMessage { message_id, data })
            } else {
                None
            }
        };

        if claimed.is_some() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }

        Ok(claimed)
    }

    /// Mark a processing message as consumed and forget it.
    pub fn ack(&self, message_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut message_keys = write_txn.open_table(MESSAGE_KEYS)?;
            let key = message_keys.get(message_id)?.map(|v| v.value().to_string());

            match key {
                Some(key) => {
                    let mut processing = write_txn.open_table(PROCESSING)?;
                    if processing.remove(key.as_str())?.is_some() {
                        message_keys.remove(message_id)?;
                        let mut key_messages = write_txn.open_table(KEY_MESSAGES)?;
                        key_messages.remove(key.as_str())?;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Move a processing message back to pending at its original position.
    pub fn requeue(&self, message_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let moved = {
            let message_keys = write_txn.open_table(MESSAGE_KEYS)?;
            let key = message_keys.get(message_id)?.map(|v| v.value().to_string());

            match key {
                Some(key) => {
                    let mut processing = write_txn.open_table(PROCESSING)?;
                    let data = processing.remove(key.as_str())?.map(|v| v.value().to_vec());
                    if let Some(data) = data {
                        let mut pending = write_txn.open_table(PENDING)?;
                        pending.insert(key.as_str(), data.as_slice())?;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if moved {
            write_txn.commit()?;
            self.notify.notify_waiters();
        } else {
            write_txn.abort()?;
        }
        Ok(moved)
    }

    /// Move every processing message back to pending.
    ///
    /// Called on startup: anything still in processing belonged to a pass that
    /// never acknowledged it.
    pub fn recover_processing(&self) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let recovered = {
            let mut processing = write_txn.open_table(PROCESSING)?;
            let entries: Vec<(String, Vec<u8>)> = processing
                .iter()?
                .filter_map(|e| {
                    e.ok()
                        .map(|(k, v)| (k.value().to_string(), v.value().to_vec()))
                })
                .collect();

            let mut pending = write_txn.open_table(PENDING)?;
            for (key, data) in &entries {
                processing.remove(key.as_str())?;
                pending.insert(key.as_str(), data.as_slice())?;
            }
            entries.len()
        };
        write_txn.commit()?;

        if recovered > 0 {
            debug!(recovered, "Moved unacknowledged messages back to pending");
            self.notify.notify_waiters();
        }
        Ok(recovered)
    }

    /// Number of pending messages for a session
    pub fn pending_count(&self, session_id: &str) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING)?;
        let (start, end) = prefix_range(&format!("{}:", session_id));

        let mut count = 0;
        for item in pending.range(start.as_str()..end.as_str())? {
            let (key, _) = item?;
            if key_session(key.value()) == Some(session_id) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of messages claimed but not yet acknowledged for a session
    pub fn processing_count(&self, session_id: &str) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let processing = read_txn.open_table(PROCESSING)?;
        let (start, end) = prefix_range(&format!("{}:", session_id));

        let mut count = 0;
        for item in processing.range(start.as_str()..end.as_str())? {
            let (key, _) = item?;
            if key_session(key.value()) == Some(session_id) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Distinct session ids that have at least one pending message
    pub fn sessions_with_pending(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING)?;

        let mut sessions = BTreeSet::new();
        for item in pending.iter()? {
            let (key, _) = item?;
            if let Some(session) = key_session(key.value()) {
                sessions.insert(session.to_string());
            }
        }
        Ok(sessions.into_iter().collect())
    }

    /// Drop every pending and processing message of a session
    pub fn clear_session(&self, session_id: &str) -> Result<usize> {
        let (start, end) = prefix_range(&format!("{}:", session_id));
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut pending = write_txn.open_table(PENDING)?;
            let mut processing = write_txn.open_table(PROCESSING)?;

            let mut keys = Vec::new();
            for item in pending.range(start.as_str()..end.as_str())? {
                let (key, _) = item?;
                if key_session(key.value()) == Some(session_id) {
                    keys.push(key.value().to_string());
                }
            }
            for item in processing.range(start.as_str()..end.as_str())? {
                let (key, _) = item?;
                if key_session(key.value()) == Some(session_id) {
                    keys.push(key.value().to_string());
                }
            }

            let mut message_keys = write_txn.open_table(MESSAGE_KEYS)?;
            let mut key_messages = write_txn.open_table(KEY_MESSAGES)?;
            for key in &keys {
                pending.remove(key.as_str())?;
                processing.remove(key.as_str())?;
                let message_id = key_messages.remove(key.as_str())?.map(|v| v.value().to_string());
                if let Some(message_id) = message_id {
                    message_keys.remove(message_id.as_str())?;
                }
            }
            keys.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_test_queue() -> (MessageQueue, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(Database::create(db_path).unwrap());
        let queue = MessageQueue::new(db).unwrap();
        (queue, temp_dir)
    }

    #[test]
    fn test_claim_in_arrival_order() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("session-a", "msg-1", b"first").unwrap();
        queue.enqueue("session-b", "msg-2", b"other session").unwrap();
        queue.enqueue("session-a", "msg-3", b"second").unwrap();

        let first = queue.claim_next("session-a").unwrap().unwrap();
        assert_eq!(first.message_id, "msg-1");
        assert_eq!(first.data, b"first");

        let second = queue.claim_next("session-a").unwrap().unwrap();
        assert_eq!(second.message_id, "msg-3");

        assert!(queue.claim_next("session-a").unwrap().is_none());
        assert_eq!(queue.pending_count("session-b").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_message_id_is_ignored() {
        let (queue, _temp_dir) = setup_test_queue();

        assert!(queue.enqueue("session-a", "msg-1", b"data").unwrap());
        assert!(!queue.enqueue("session-a", "msg-1", b"data again").unwrap());
        assert_eq!(queue.pending_count("session-a").unwrap(), 1);

        // Still known while processing
        queue.claim_next("session-a").unwrap();
        assert!(!queue.enqueue("session-a", "msg-1", b"data").unwrap());
    }

    #[test]
    fn test_ack_removes_message() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("session-a", "msg-1", b"data").unwrap();
        let claimed = queue.claim_next("session-a").unwrap().unwrap();
        assert_eq!(queue.processing_count("session-a").unwrap(), 1);

        assert!(queue.ack(&claimed.message_id).unwrap());
        assert_eq!(queue.processing_count("session-a").unwrap(), 0);
        assert!(!queue.ack(&claimed.message_id).unwrap());
    }

    #[test]
    fn test_requeue_keeps_position() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("session-a", "msg-1", b"first").unwrap();
        queue.enqueue("session-a", "msg-2", b"second").unwrap();

        let claimed = queue.claim_next("session-a").unwrap().unwrap();
        assert!(queue.requeue(&claimed.message_id).unwrap());

        let again = queue.claim_next("session-a").unwrap().unwrap();
        assert_eq!(again.message_id, "msg-1");
    }

    #[test]
    fn test_recover_processing() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("session-a", "msg-1", b"first").unwrap();
        queue.enqueue("session-b", "msg-2", b"second").unwrap();
        queue.claim_next("session-a").unwrap();
        queue.claim_next("session-b").unwrap();

        assert_eq!(queue.recover_processing().unwrap(), 2);
        assert_eq!(queue.pending_count("session-a").unwrap(), 1);
        assert_eq!(queue.pending_count("session-b").unwrap(), 1);
        assert_eq!(queue.processing_count("session-a").unwrap(), 0);
    }

    #[test]
    fn test_session_ids_with_separator() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("a:b", "msg-1", b"nested").unwrap();
        queue.enqueue("a", "msg-2", b"plain").unwrap();

        assert_eq!(queue.pending_count("a").unwrap(), 1);
        let claimed = queue.claim_next("a").unwrap().unwrap();
        assert_eq!(claimed.message_id, "msg-2");
        assert!(queue.claim_next("a").unwrap().is_none());
        assert_eq!(queue.pending_count("a:b").unwrap(), 1);
    }

    #[test]
    fn test_sessions_with_pending_and_clear() {
        let (queue, _temp_dir) = setup_test_queue();

        queue.enqueue("session-a", "msg-1", b"one").unwrap();
        queue.enqueue("session-a", "msg-2", b"two").unwrap();
        queue.enqueue("session-b", "msg-3", b"three").unwrap();
        queue.claim_next("session-a").unwrap();

        assert_eq!(
            queue.sessions_with_pending().unwrap(),
            vec!["session-a".to_string(), "session-b".to_string()]
        );

        assert_eq!(queue.clear_session("session-a").unwrap(), 2);
        assert_eq!(queue.pending_count("session-a").unwrap(), 0);
        assert_eq!(queue.processing_count("session-a").unwrap(), 0);
        assert_eq!(queue.sessions_with_pending().unwrap(), vec!["session-b".to_string()]);

        // Ids are free again after clearing
        assert!(queue.enqueue("session-a", "msg-1", b"one").unwrap());
    }

    #[tokio::test]
    async fn test_enqueue_wakes_waiter() {
        let (queue, _temp_dir) = setup_test_queue();

        let notify = queue.notifier();
        let wait_handle = tokio::spawn(async move {
            tokio::select! {
                _ = notify.notified() => true,
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(200)) => false,
            }
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        queue.enqueue("session-a", "msg-1", b"new").unwrap();

        assert!(wait_handle.await.unwrap());
    }
}
