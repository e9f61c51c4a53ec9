//! # Memvault Core
//!
//! Local memory store for assistants and agents. Short text memories are kept
//! in SQLite, searched with FTS5 and sealed at rest in a machine-bound
//! encrypted envelope.
//!
//! - **Deduplication**: one record per distinct content (SHA-256), stable ids
//! - **Keyword Search**: FTS5 with porter stemming and rank-normalized relevance
//! - **At-Rest Encryption**: AES-256-CTR envelope, PBKDF2-HMAC-SHA256 key
//!   derived from host signals and never written to disk
//! - **Integrity**: plaintext digest verified on every open; a mismatch halts
//!   the vault
//! - **Input Hygiene**: size limits and secret-shaped content rejected before
//!   any write
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memvault_core::{MemoryVault, SearchFilters, StoreRequest, VaultConfig};
//!
//! # fn main() -> Result<(), memvault_core::VaultError> {
//! let vault = MemoryVault::new(VaultConfig::from_env());
//! vault.initialize()?;
//!
//! let id = vault.store_memory(
//!     StoreRequest::new("User prefers TypeScript over JavaScript")
//!         .context("preferences")
//!         .record_type("preference"),
//! )?;
//!
//! let hits = vault.search_memories("TypeScript", 10, SearchFilters::default())?;
//! assert_eq!(hits[0].id, id);
//!
//! vault.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): Compile SQLite (with FTS5) from source

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod crypto;
pub mod memory;
pub mod search;
pub mod storage;
pub mod vault;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    validate_limit, ContentValidator, Record, SearchFilters, SearchQuery, SearchResult,
    SecuritySignal, Stats, StoreRequest, ValidationError, DEFAULT_LABEL, MAX_CONTENT_CHARS,
};

// Storage layer
pub use storage::{IndexReport, RecordMutation, RecordRow, Storage, StorageError};

// Search
pub use search::{relevance_from_rank, sanitize_fts5_query};

// Crypto
pub use crypto::{
    ContainerError, EncryptedContainer, Envelope, EnvironmentSignals, IntegrityError,
    MachineSignals, OpenOutcome, SystemSignals,
};

// Facade
pub use config::{SecretPattern, VaultConfig, VaultPaths};
pub use vault::{ErrorKind, MemoryVault, VaultError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ErrorKind, MemoryVault, Record, SearchFilters, SearchResult, Stats, StoreRequest,
        VaultConfig, VaultError,
    };
}
