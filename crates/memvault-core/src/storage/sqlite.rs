//! SQLite Storage Implementation
//!
//! The authoritative record table plus its FTS5 projection. Every write goes
//! through [`Storage::apply`], which pairs the record change with the matching
//! index change inside one transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::crypto::integrity;
use crate::memory::{
    ContentRejection, ContentValidator, Record, SearchQuery, SearchResult, SecuritySignal, Stats,
    StoreRequest, ValidationError,
};
use crate::search::{self, IndexEntry, IndexMutation};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Tags or metadata could not be encoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Caller input rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Content looked like a credential
    #[error(transparent)]
    Security(#[from] SecuritySignal),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl From<ContentRejection> for StorageError {
    fn from(rejection: ContentRejection) -> Self {
        match rejection {
            ContentRejection::Invalid(e) => StorageError::Validation(e),
            ContentRejection::Secret(s) => StorageError::Security(s),
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// MUTATIONS
// ============================================================================

/// A fully validated record write
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRow {
    pub content: String,
    pub context: String,
    pub record_type: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub content_hash: String,
}

impl RecordRow {
    /// Hash the content and take the request's labels as-is (no validation)
    pub fn from_request(request: StoreRequest) -> Self {
        let content_hash = integrity::hash_content(&request.content);
        Self {
            content: request.content,
            context: request.context,
            record_type: request.record_type,
            tags: request.tags,
            metadata: request.metadata,
            content_hash,
        }
    }

    fn index_entry(&self, id: i64) -> IndexEntry {
        IndexEntry::new(id, &self.content, &self.context, &self.tags)
    }
}

/// A change to the record table
#[derive(Debug, Clone, PartialEq)]
pub enum RecordMutation {
    /// New record; id assigned by the store
    Insert(RecordRow),
    /// Overwrite an existing record in place, keeping its id and created_at
    Replace { id: u64, row: RecordRow },
    Delete { id: u64 },
}

/// Consistency report between the record table and the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub records: u64,
    pub indexed: u64,
    /// Records with no index entry
    pub missing_from_index: Vec<u64>,
    /// Index entries with no record
    pub orphaned_entries: Vec<u64>,
}

impl IndexReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.orphaned_entries.is_empty()
    }
}

// ============================================================================
// STORAGE
// ============================================================================

/// Record store over one SQLite file.
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, so the store is `Send + Sync`. The writer lock
/// serializes every mutation; each mutation commits the record and index
/// halves together, so the reader never sees one without the other.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    validator: ContentValidator,
}

impl Storage {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`
    pub fn open(path: &Path, validator: ContentValidator) -> Result<Self> {
        // Open writer connection
        let writer_conn = Connection::open(path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn)?;

        // Open reader connection to same path
        let reader_conn = Connection::open(path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            validator,
        })
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn lock_reader(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    /// Store a memory, deduplicating by content hash.
    ///
    /// Validation and the secret scan run before any database access. If the
    /// same content already exists, that record is replaced in place and its
    /// id returned.
    pub fn put(&self, request: StoreRequest) -> Result<u64> {
        self.validator.validate(&request.content)?;
        let row = RecordRow::from_request(request);

        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM memories WHERE content_hash = ?1",
                params![row.content_hash],
                |r| r.get(0),
            )
            .optional()?;

        let mutation = match existing {
            Some(id) => RecordMutation::Replace { id: id as u64, row },
            None => RecordMutation::Insert(row),
        };

        let id = Self::apply_in(&tx, &mutation)?
            .ok_or_else(|| StorageError::Init("Store produced no record id".into()))?;
        tx.commit()?;

        match mutation {
            RecordMutation::Replace { .. } => tracing::debug!(id, "Replaced duplicate memory"),
            _ => tracing::debug!(id, "Stored memory"),
        }
        Ok(id)
    }

    /// Apply one record mutation together with its index mutation.
    ///
    /// Returns the affected id, or `None` when a replace/delete target does
    /// not exist. Either both halves commit or neither does.
    pub fn apply(&self, mutation: RecordMutation) -> Result<Option<u64>> {
        let mut writer = self.lock_writer()?;
        let tx = writer.transaction()?;
        let affected = Self::apply_in(&tx, &mutation)?;
        tx.commit()?;
        Ok(affected)
    }

    fn apply_in(tx: &Transaction<'_>, mutation: &RecordMutation) -> Result<Option<u64>> {
        let now = format_timestamp(Utc::now());

        let (affected, index_mutation) = match mutation {
            RecordMutation::Insert(row) => {
                tx.execute(
                    "INSERT INTO memories (
                        content, context, record_type, tags, metadata, content_hash,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.content,
                        row.context,
                        row.record_type,
                        serde_json::to_string(&row.tags)?,
                        serde_json::to_string(&row.metadata)?,
                        row.content_hash,
                        now,
                        now,
                    ],
                )?;
                let id = tx.last_insert_rowid();
                (Some(id), Some(IndexMutation::Add(row.index_entry(id))))
            }
            RecordMutation::Replace { id, row } => {
                let id = sql_id(*id);
                let changed = tx.execute(
                    "UPDATE memories SET
                        content = ?1, context = ?2, record_type = ?3, tags = ?4,
                        metadata = ?5, content_hash = ?6, updated_at = ?7
                     WHERE id = ?8",
                    params![
                        row.content,
                        row.context,
                        row.record_type,
                        serde_json::to_string(&row.tags)?,
                        serde_json::to_string(&row.metadata)?,
                        row.content_hash,
                        now,
                        id,
                    ],
                )?;
                if changed == 0 {
                    (None, None)
                } else {
                    (Some(id), Some(IndexMutation::Replace(row.index_entry(id))))
                }
            }
            RecordMutation::Delete { id } => {
                let id = sql_id(*id);
                let changed = tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
                if changed == 0 {
                    (None, None)
                } else {
                    (Some(id), Some(IndexMutation::Remove { id }))
                }
            }
        };

        if let Some(index_mutation) = index_mutation {
            search::apply_index_mutation(tx, &index_mutation)?;
        }
        Ok(affected.map(|id| id as u64))
    }

    /// Get a record by id
    pub fn get_by_id(&self, id: u64) -> Result<Option<Record>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare("SELECT * FROM memories WHERE id = ?1")?;
        let record = stmt
            .query_row(params![sql_id(id)], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Delete a record by id; `false` if it did not exist
    pub fn delete_by_id(&self, id: u64) -> Result<bool> {
        let deleted = self.apply(RecordMutation::Delete { id })?.is_some();
        if deleted {
            tracing::debug!(id, "Deleted memory");
        }
        Ok(deleted)
    }

    /// Aggregate statistics, computed from the table on every call
    pub fn stats(&self) -> Result<Stats> {
        let reader = self.lock_reader()?;
        let (total, bytes, last): (i64, i64, Option<String>) = reader.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(LENGTH(CAST(content AS BLOB))), 0),
                    MAX(updated_at)
             FROM memories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let last_updated = last
            .map(|s| parse_timestamp(&s, "updated_at"))
            .transpose()?;

        Ok(Stats {
            total_records: total.max(0) as u64,
            total_content_bytes: bytes.max(0) as u64,
            last_updated,
        })
    }

    /// Number of stored records
    pub fn count(&self) -> Result<u64> {
        let reader = self.lock_reader()?;
        let n: i64 = reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// Records newest first (paginated)
    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<Record>> {
        let reader = self.lock_reader()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memories
             ORDER BY id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(
            params![
                i64::try_from(limit).unwrap_or(i64::MAX),
                i64::try_from(offset).unwrap_or(i64::MAX)
            ],
            row_to_record,
        )?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Ranked full-text search
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let reader = self.lock_reader()?;
        Ok(search::search(&reader, query)?)
    }

    /// Compare the record ids with the index rowids
    pub fn verify_index(&self) -> Result<IndexReport> {
        let reader = self.lock_reader()?;

        let mut stmt = reader.prepare("SELECT id FROM memories ORDER BY id")?;
        let record_ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let indexed = search::indexed_ids(&reader)?;

        let missing_from_index = record_ids
            .iter()
            .filter(|id| indexed.binary_search(id).is_err())
            .map(|&id| id as u64)
            .collect();
        let orphaned_entries = indexed
            .iter()
            .filter(|id| record_ids.binary_search(id).is_err())
            .map(|&id| id as u64)
            .collect();

        Ok(IndexReport {
            records: record_ids.len() as u64,
            indexed: indexed.len() as u64,
            missing_from_index,
            orphaned_entries,
        })
    }

    /// Fold the WAL back into the main database file
    pub fn checkpoint(&self) -> Result<()> {
        let writer = self.lock_writer()?;
        writer.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Checkpoint and close both connections so the file can be sealed
    pub fn close(self) -> Result<()> {
        self.checkpoint()?;

        let reader = self
            .reader
            .into_inner()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        reader.close().map_err(|(_, e)| StorageError::Database(e))?;

        let writer = self
            .writer
            .into_inner()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        writer.close().map_err(|(_, e)| StorageError::Database(e))?;
        Ok(())
    }
}

// ============================================================================
// ROW HELPERS
// ============================================================================

/// Ids are assigned by SQLite and always fit in i64; anything larger cannot
/// match a row
fn sql_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(-1)
}

/// Fixed-width RFC3339 so lexical order matches time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse RFC3339 timestamp
pub(crate) fn parse_timestamp(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Invalid {} timestamp '{}': {}", field_name, value, e),
                )),
            )
        })
}

/// Convert a row to Record
fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
    let id: i64 = row.get("id")?;
    let tags_json: String = row.get("tags")?;
    let metadata_json: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Record {
        id: id as u64,
        content: row.get("content")?,
        context: row.get("context")?,
        record_type: row.get("record_type")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        content_hash: row.get("content_hash")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
