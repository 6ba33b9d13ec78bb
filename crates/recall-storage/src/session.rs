//! Session storage - byte-level API for active session state.
//!
//! One row per content session id. Each save replaces the whole row, so a
//! reader always sees the state as of the last completed save.
//!
//! # Tables
//!
//! - `sessions`: content_session_id -> serialized session state

use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::sync::Arc;

const SESSION_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Persisted session state keyed by content session id
#[derive(Debug, Clone)]
pub struct SessionStorage {
    db: Arc<Database>,
}

impl SessionStorage {
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(SESSION_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Replace the stored state of a session.
    pub fn save_state(&self, session_id: &str, data: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.insert(session_id, data)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn load_state(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;
        Ok(table.get(session_id)?.map(|value| value.value().to_vec()))
    }

    /// Every stored session as `(session_id, state)`, ordered by id.
    pub fn list_states(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;

        let mut states = Vec::new();
        for item in table.iter()? {
            let (key, value) = item?;
            states.push((key.value().to_string(), value.value().to_vec()));
        }
        Ok(states)
    }

    /// Ids of every stored session without reading their state.
    pub fn session_ids(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;

        let mut ids = Vec::new();
        for item in table.iter()? {
            let (key, _) = item?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    /// Remove a session's state. Returns whether a row existed.
    pub fn delete_state(&self, session_id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SESSION_TABLE)?;
            table.remove(session_id)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    pub fn count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSION_TABLE)?;
        Ok(table.len()? as usize)
    }
}
