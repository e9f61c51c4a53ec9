//! Record - The stored unit of memory
//!
//! Each record carries:
//! - The remembered text plus its context and type labels
//! - Ordered tags and string metadata
//! - The content hash used for deduplication

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Context and type label used when the caller does not supply one
pub const DEFAULT_LABEL: &str = "general";

// ============================================================================
// RECORD
// ============================================================================

/// A stored memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Store-assigned, monotonic, never reused
    pub id: u64,
    pub content: String,
    pub context: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    /// Hex SHA-256 of `content`; unique across the store
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for storing a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreRequest {
    pub content: String,
    pub context: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Default for StoreRequest {
    fn default() -> Self {
        Self {
            content: String::new(),
            context: DEFAULT_LABEL.to_string(),
            record_type: DEFAULT_LABEL.to_string(),
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl StoreRequest {
    /// Request with default context and type
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = record_type.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// SEARCH
// ============================================================================

/// Optional equality filters applied alongside a full-text match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(rename = "type")]
    pub record_type: Option<String>,
    pub context: Option<String>,
}

impl SearchFilters {
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A fully specified keyword search against the index
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub filters: SearchFilters,
    /// Results scoring below this are dropped after `limit` is applied
    pub min_relevance: f64,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            offset: 0,
            filters: SearchFilters::default(),
            min_relevance: 0.1,
        }
    }
}

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: u64,
    pub content: String,
    /// Normalized to [0, 1], higher is better
    pub relevance: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub context: String,
    pub tags: Vec<String>,
}

// ============================================================================
// STATS
// ============================================================================

/// Aggregate figures, always recomputed from the record table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_records: u64,
    /// UTF-8 byte length summed over all record contents
    pub total_content_bytes: u64,
    /// Most recent `updated_at`, `None` for an empty store
    pub last_updated: Option<DateTime<Utc>>,
}
