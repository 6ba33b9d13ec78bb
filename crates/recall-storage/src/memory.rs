//! Memory storage - byte-level API for persisted observations and summaries.
//!
//! Every record produced from a backend reply is stored here under an id the
//! caller derives from the item it answers, so storing the records of one
//! item twice is a no-op.
//!
//! # Tables
//!
//! - `memory_records`: record_id -> record_data
//! - `memory_session_index`: memory_session_id:record_id -> record_id
//! - `memory_hash_index`: content_hash -> first record_id with that content

use anyhow::Result;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::sync::Arc;

use crate::range_utils::prefix_range;

const MEMORY_RECORD_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("memory_records");

/// Index: memory_session_id:record_id -> record_id
const SESSION_INDEX_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("memory_session_index");
/// Index: content_hash -> record_id
const HASH_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("memory_hash_index");

/// Low-level memory record storage with byte-level API
#[derive(Clone)]
pub struct MemoryStorage {
    db: Arc<Database>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutResult {
    Created(String),
    Existing(String),
}

impl PutResult {
    pub fn is_created(&self) -> bool {
        matches!(self, PutResult::Created(_))
    }

    pub fn id(&self) -> &str {
        match self {
            PutResult::Created(id) | PutResult::Existing(id) => id,
        }
    }
}

impl MemoryStorage {
    /// Create a new MemoryStorage instance
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(MEMORY_RECORD_TABLE)?;
        write_txn.open_table(SESSION_INDEX_TABLE)?;
        write_txn.open_table(HASH_INDEX_TABLE)?;
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Store a record unless one with the same id already exists.
    ///
    /// The lookup and the insert share one write transaction, so concurrent
    /// writers of the same id produce exactly one record.
    pub fn put_record_if_not_exists(
        &self,
        record_id: &str,
        session_id: &str,
        content_hash: &str,
        data: &[u8],
    ) -> Result<PutResult> {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut record_table = write_txn.open_table(MEMORY_RECORD_TABLE)?;
            let exists = record_table.get(record_id)?.is_some();

            if exists {
                PutResult::Existing(record_id.to_string())
            } else {
                record_table.insert(record_id, data)?;

                let mut session_index = write_txn.open_table(SESSION_INDEX_TABLE)?;
                let session_key = format!("{}:{}", session_id, record_id);
                session_index.insert(session_key.as_str(), record_id)?;

                let mut hash_index = write_txn.open_table(HASH_INDEX_TABLE)?;
                if hash_index.get(content_hash)?.is_none() {
                    hash_index.insert(content_hash, record_id)?;
                }

                PutResult::Created(record_id.to_string())
            }
        };

        if result.is_created() {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(result)
    }

    /// Get raw record data by ID
    pub fn get_record_raw(&self, record_id: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(MEMORY_RECORD_TABLE)?;

        if let Some(value) = table.get(record_id)? {
            Ok(Some(value.value().to_vec()))
        } else {
            Ok(None)
        }
    }

    /// Find the record id stored for a content hash
    pub fn find_by_hash(&self, content_hash: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let hash_index = read_txn.open_table(HASH_INDEX_TABLE)?;
        Ok(hash_index.get(content_hash)?.map(|v| v.value().to_string()))
    }

    /// List all records for a memory session
    pub fn list_records_by_session_raw(&self, session_id: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read()?;
        let session_index = read_txn.open_table(SESSION_INDEX_TABLE)?;
        let record_table = read_txn.open_table(MEMORY_RECORD_TABLE)?;

        let (start, end) = prefix_range(&format!("{}:", session_id));
        let mut records = Vec::new();

        for item in session_index.range(start.as_str()..end.as_str())? {
            let (_, value) = item?;
            let record_id = value.value();
            if let Some(record_data) = record_table.get(record_id)? {
                records.push((record_id.to_string(), record_data.value().to_vec()));
            }
        }

        Ok(records)
    }

    /// Count records for a memory session
    pub fn count_records_by_session(&self, session_id: &str) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let session_index = read_txn.open_table(SESSION_INDEX_TABLE)?;

        let (start, end) = prefix_range(&format!("{}:", session_id));
        let mut count = 0;
        for item in session_index.range(start.as_str()..end.as_str())? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Delete a record together with its index entries
    pub fn delete_record(&self, record_id: &str, session_id: &str, content_hash: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut record_table = write_txn.open_table(MEMORY_RECORD_TABLE)?;
            let existed = record_table.remove(record_id)?.is_some();

            let mut session_index = write_txn.open_table(SESSION_INDEX_TABLE)?;
            let session_key = format!("{}:{}", session_id, record_id);
            session_index.remove(session_key.as_str())?;

            let mut hash_index = write_txn.open_table(HASH_INDEX_TABLE)?;
            let points_here = hash_index
                .get(content_hash)?
                .map(|v| v.value() == record_id)
                .unwrap_or(false);
            if points_here {
                hash_index.remove(content_hash)?;
            }

            existed
        };
        write_txn.commit()?;
        Ok(existed)
    }
}
