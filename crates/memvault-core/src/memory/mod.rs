//! Memory module - Core types and input validation
//!
//! Implements the record model with:
//! - Records keyed by a monotonic id and deduplicated by content hash
//! - Search queries, filters and ranked results
//! - Aggregate statistics
//! - Content validation and secret detection

mod record;
mod validation;

pub use record::{
    Record, SearchFilters, SearchQuery, SearchResult, Stats, StoreRequest, DEFAULT_LABEL,
};
pub use validation::{
    validate_limit, ContentRejection, ContentValidator, SecuritySignal, ValidationError,
    DEFAULT_SECRET_PATTERNS, MAX_CONTENT_CHARS,
};
