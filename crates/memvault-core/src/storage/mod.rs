//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Monotonic record ids and content-hash deduplication
//! - FTS5 index kept in lockstep with the record table
//! - Versioned schema migrations

mod migrations;
mod sqlite;

pub use migrations::{apply_migrations, get_current_version, Migration, MIGRATIONS};
pub(crate) use sqlite::parse_timestamp;
pub use sqlite::{IndexReport, RecordMutation, RecordRow, Result, Storage, StorageError};
