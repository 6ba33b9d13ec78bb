//! Storage layer with typed wrappers around recall-storage.

pub mod message_queue;
pub mod record;
pub mod session;

use anyhow::Result;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

pub use message_queue::MessageQueueStorage;
pub use record::MemoryRecordStorage;
pub use session::SessionStateStorage;

/// Typed access to every storage subsystem.
#[derive(Clone)]
pub struct Storage {
    db: Arc<Database>,
    pub queue: MessageQueueStorage,
    pub records: MemoryRecordStorage,
    pub sessions: SessionStateStorage,
}

impl Storage {
    /// Open (or create) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let raw = recall_storage::Storage::new(path)?;

        Ok(Self {
            db: raw.get_db(),
            queue: MessageQueueStorage::new(raw.queue),
            records: MemoryRecordStorage::new(raw.memory),
            sessions: SessionStateStorage::new(raw.sessions),
        })
    }

    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }
}
