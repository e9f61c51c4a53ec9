//! Keyword Search (FTS5)
//!
//! The lexical index over `content`, `context` and `tags`. Index rows share
//! their rowid with the record they project, and they are only ever written
//! through [`apply_index_mutation`], inside the caller's transaction.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::memory::{SearchQuery, SearchResult};

/// Rank-to-relevance scale factor
const RANK_SCALE: f64 = 0.1;

// ============================================================================
// QUERY HANDLING
// ============================================================================

/// Sanitize a free-text query for FTS5 MATCH.
///
/// Everything except alphanumerics, whitespace, `-` and `_` is replaced by a
/// space. Each remaining term is double-quoted so hyphens and the bare
/// keywords `AND`/`OR`/`NOT`/`NEAR` match literally; terms are implicitly
/// AND-ed. Returns an empty string when nothing searchable is left.
pub fn sanitize_fts5_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map an FTS5 rank (lower = better, unbounded) into [0, 1]
pub fn relevance_from_rank(rank: f64) -> f64 {
    if !rank.is_finite() {
        return 0.0;
    }
    (1.0 / (1.0 + rank.abs() * RANK_SCALE)).clamp(0.0, 1.0)
}

// ============================================================================
// INDEX MUTATIONS
// ============================================================================

/// The projection of a record held by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: i64,
    pub content: String,
    pub context: String,
    /// Tags joined by spaces
    pub tags: String,
}

impl IndexEntry {
    pub fn new(id: i64, content: &str, context: &str, tags: &[String]) -> Self {
        Self {
            id,
            content: content.to_string(),
            context: context.to_string(),
            tags: tags.join(" "),
        }
    }
}

/// Index-side counterpart of a record mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexMutation {
    Add(IndexEntry),
    /// Remove then add, never leaving a partial entry
    Replace(IndexEntry),
    Remove { id: i64 },
}

/// Apply one index mutation on the given connection or transaction
pub fn apply_index_mutation(conn: &Connection, mutation: &IndexMutation) -> rusqlite::Result<()> {
    match mutation {
        IndexMutation::Add(entry) => insert_entry(conn, entry),
        IndexMutation::Replace(entry) => {
            remove_entry(conn, entry.id)?;
            insert_entry(conn, entry)
        }
        IndexMutation::Remove { id } => remove_entry(conn, *id),
    }
}

fn insert_entry(conn: &Connection, entry: &IndexEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO memories_fts (rowid, content, context, tags) VALUES (?1, ?2, ?3, ?4)",
        params![entry.id, entry.content, entry.context, entry.tags],
    )?;
    Ok(())
}

fn remove_entry(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM memories_fts WHERE rowid = ?1", params![id])?;
    Ok(())
}

/// All rowids currently in the index, ascending
pub fn indexed_ids(conn: &Connection) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT rowid FROM memories_fts ORDER BY rowid")?;
    let ids = stmt.query_map([], |row| row.get(0))?;
    ids.collect()
}

// ============================================================================
// SEARCH
// ============================================================================

/// Run a ranked full-text search.
///
/// `limit`/`offset` are applied by SQLite before the relevance floor, so
/// fewer than `limit` results may come back. Order is FTS5 rank order only.
pub fn search(conn: &Connection, query: &SearchQuery) -> rusqlite::Result<Vec<SearchResult>> {
    let sanitized = sanitize_fts5_query(&query.query);
    if sanitized.is_empty() {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT m.id, m.content, m.record_type, m.context, m.tags, m.created_at, memories_fts.rank
         FROM memories_fts
         JOIN memories m ON m.id = memories_fts.rowid
         WHERE memories_fts MATCH ?",
    );
    let mut values: Vec<Value> = vec![Value::Text(sanitized)];

    if let Some(record_type) = &query.filters.record_type {
        sql.push_str(" AND m.record_type = ?");
        values.push(Value::Text(record_type.clone()));
    }
    if let Some(context) = &query.filters.context {
        sql.push_str(" AND m.context = ?");
        values.push(Value::Text(context.clone()));
    }

    sql.push_str(" ORDER BY memories_fts.rank LIMIT ? OFFSET ?");
    values.push(Value::Integer(clamp_to_i64(query.limit)));
    values.push(Value::Integer(clamp_to_i64(query.offset)));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        let id: i64 = row.get(0)?;
        let tags_json: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let rank: f64 = row.get(6)?;

        Ok(SearchResult {
            id: id as u64,
            content: row.get(1)?,
            relevance: relevance_from_rank(rank),
            timestamp: crate::storage::parse_timestamp(&created_at, "created_at")?,
            record_type: row.get(2)?,
            context: row.get(3)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        let result = row?;
        if result.relevance >= query.min_relevance {
            results.push(result);
        }
    }
    Ok(results)
}

fn clamp_to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
