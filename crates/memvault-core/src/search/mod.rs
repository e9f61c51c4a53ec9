//! Search Module
//!
//! Provides lexical search over stored memories:
//! - FTS5 keyword search with query sanitization
//! - Rank-to-relevance normalization
//! - Explicit index mutations paired with record mutations

mod keyword;

pub use keyword::{
    apply_index_mutation, indexed_ids, relevance_from_rank, sanitize_fts5_query, search,
    IndexEntry, IndexMutation,
};
