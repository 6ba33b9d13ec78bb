//! Recall Storage - Low-level storage abstraction layer
//!
//! Persistence for the memory-capture pipeline, using redb as the embedded
//! database. Everything here is byte-level; typed wrappers live in
//! `recall-core`.
//!
//! # Tables
//!
//! - `queue_*` - Per-session pending/processing work queue
//! - `memory_*` - Observations and summaries with content-hash index
//! - `sessions` - Active session snapshots

pub mod memory;
pub mod message_queue;
pub mod range_utils;
pub mod session;

use anyhow::Result;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

pub use memory::{MemoryStorage, PutResult};
pub use message_queue::{ClaimedMessage, MessageQueue};
pub use session::SessionStorage;

/// Central storage manager that initializes all storage subsystems
pub struct Storage {
    db: Arc<Database>,
    pub queue: MessageQueue,
    pub memory: MemoryStorage,
    pub sessions: SessionStorage,
}

impl Storage {
    /// Open (or create) the database file and initialize all tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = Arc::new(Database::create(path.as_ref())?);

        let queue = MessageQueue::new(db.clone())?;
        let memory = MemoryStorage::new(db.clone())?;
        let sessions = SessionStorage::new(db.clone())?;

        Ok(Self {
            db,
            queue,
            memory,
            sessions,
        })
    }

    /// Get a reference to the underlying database
    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reopen_keeps_queue() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("recall.db");

        {
            let storage = Storage::new(&path).unwrap();
            storage.queue.enqueue("s1", "m1", b"payload").unwrap();
            storage.queue.claim_next("s1").unwrap();
        }

        let storage = Storage::new(&path).unwrap();
        assert_eq!(storage.queue.recover_processing().unwrap(), 1);
        let claimed = storage.queue.claim_next("s1").unwrap().unwrap();
        assert_eq!(claimed.message_id, "m1");
    }
}
