//! Typed persistence of active session state.

use anyhow::{Context, Result};

use crate::models::{ActiveSession, SessionSnapshot};

#[derive(Clone)]
pub struct SessionStateStorage {
    inner: recall_storage::SessionStorage,
}

impl SessionStateStorage {
    pub fn new(inner: recall_storage::SessionStorage) -> Self {
        Self { inner }
    }

    pub fn save(&self, session: &ActiveSession) -> Result<()> {
        let bytes = serde_json::to_vec(session)?;
        self.inner.save_state(&session.content_session_id, &bytes)
    }

    pub fn load(&self, content_session_id: &str) -> Result<Option<ActiveSession>> {
        match self.inner.load_state(content_session_id)? {
            Some(bytes) => {
                let session = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt session state {}", content_session_id))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Snapshots of every persisted session, skipping unreadable rows.
    pub fn list_snapshots(&self) -> Result<Vec<SessionSnapshot>> {
        let mut snapshots = Vec::new();
        for (id, bytes) in self.inner.list_states()? {
            match serde_json::from_slice::<ActiveSession>(&bytes) {
                Ok(session) => snapshots.push(session.snapshot()),
                Err(err) => tracing::warn!(session_id = %id, error = %err, "Skipping corrupt session row"),
            }
        }
        Ok(snapshots)
    }

    pub fn delete(&self, content_session_id: &str) -> Result<bool> {
        self.inner.delete_state(content_session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("test.db")).unwrap());
        let storage =
            SessionStateStorage::new(recall_storage::SessionStorage::new(db).unwrap());

        let mut session = ActiveSession::new("c1", "proj", "hello", 1);
        session.bind_handle("claude-c1");
        session.add_tokens(70, 30);
        storage.save(&session).unwrap();

        let loaded = storage.load("c1").unwrap().unwrap();
        assert_eq!(loaded.memory_session_id(), Some("claude-c1"));
        assert_eq!(loaded.cumulative_input_tokens, 70);
        assert_eq!(storage.list_snapshots().unwrap().len(), 1);

        assert!(storage.delete("c1").unwrap());
        assert!(storage.load("c1").unwrap().is_none());
    }
}
