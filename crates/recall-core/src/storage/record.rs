//! Typed memory record storage wrapper.
//!
//! Records are stored with `put_if_not_exists` keyed by record id, which is
//! derived from the item the record was extracted for. Storing the records of
//! one item twice leaves exactly one copy of each.

use anyhow::Result;
use recall_storage::PutResult;

use crate::models::MemoryRecord;

#[derive(Clone)]
pub struct MemoryRecordStorage {
    inner: recall_storage::MemoryStorage,
}

impl MemoryRecordStorage {
    pub fn new(inner: recall_storage::MemoryStorage) -> Self {
        Self { inner }
    }

    /// Store a record unless one with the same id is already stored.
    pub fn put_if_not_exists(&self, record: &MemoryRecord) -> Result<PutResult> {
        let bytes = serde_json::to_vec(record)?;
        self.inner.put_record_if_not_exists(
            record.id(),
            record.memory_session_id(),
            record.content_hash(),
            &bytes,
        )
    }

    pub fn get(&self, record_id: &str) -> Result<Option<MemoryRecord>> {
        match self.inner.get_record_raw(record_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Records of a memory session, oldest first.
    pub fn list_by_session(&self, memory_session_id: &str) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        for (_, bytes) in self.inner.list_records_by_session_raw(memory_session_id)? {
            records.push(serde_json::from_slice::<MemoryRecord>(&bytes)?);
        }
        records.sort_by_key(|r| r.created_at_epoch());
        Ok(records)
    }

    pub fn count_by_session(&self, memory_session_id: &str) -> Result<usize> {
        self.inner.count_records_by_session(memory_session_id)
    }

    /// Remove every record of a memory session.
    pub fn delete_session(&self, memory_session_id: &str) -> Result<usize> {
        let records = self.list_by_session(memory_session_id)?;
        let mut removed = 0;
        for record in &records {
            if self
                .inner
                .delete_record(record.id(), memory_session_id, record.content_hash())?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
