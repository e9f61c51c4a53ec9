//! Memory Vault
//!
//! The public entry point. Owns the lifecycle of one store directory:
//!
//! ```text
//!            initialize()                close()
//!   Closed ───────────────▶ Open ───────────────▶ Closed
//!      │                                            (sealed)
//!      └── integrity failure ──▶ Halted
//! ```
//!
//! While open, the store lives as a plaintext SQLite working file next to its
//! envelope. `close()` (or dropping an open vault) checkpoints the database,
//! seals it back into the envelope and removes the plaintext.
//!
//! A vault assumes it is the only process using its directory. Two processes
//! opening the same directory at once is not supported.

use std::path::Path;
use std::sync::RwLock;

use crate::config::{VaultConfig, VaultPaths};
use crate::crypto::{
    derive_key, ContainerError, DerivedKey, EncryptedContainer, EnvironmentSignals,
    IntegrityError, SystemSignals,
};
use crate::memory::{
    validate_limit, Record, SearchFilters, SearchQuery, SearchResult, SecuritySignal, Stats,
    StoreRequest, ValidationError,
};
use crate::search::sanitize_fts5_query;
use crate::storage::{IndexReport, Storage, StorageError};

// ============================================================================
// ERRORS
// ============================================================================

/// Coarse classification of a [`VaultError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input; fix the call, do not retry
    Validation,
    /// Content looked like a credential
    SecuritySignal,
    /// The envelope failed verification; the vault is halted
    Integrity,
    Io,
    /// Operation not valid in the current lifecycle state
    State,
    Internal,
}

/// Facade error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Security(#[from] SecuritySignal),

    #[error("Integrity check failed, vault halted: {0}")]
    Integrity(#[from] IntegrityError),

    /// Envelope unreadable or produced by an unknown scheme
    #[error("Envelope rejected, vault halted: {0}")]
    Envelope(ContainerError),

    #[error("Container IO failed during {operation}: {source}")]
    Container {
        operation: &'static str,
        #[source]
        source: ContainerError,
    },

    #[error("Storage failed during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vault is not open")]
    NotOpen,

    #[error("Vault is halted after an integrity failure")]
    Halted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vault lock poisoned")]
    LockPoisoned,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::Validation(_) => ErrorKind::Validation,
            VaultError::Security(_) => ErrorKind::SecuritySignal,
            VaultError::Integrity(_) | VaultError::Envelope(_) => ErrorKind::Integrity,
            VaultError::Container {
                source: ContainerError::UnclaimedWorkingFile(_),
                ..
            } => ErrorKind::State,
            VaultError::Container { .. } | VaultError::Io(_) => ErrorKind::Io,
            VaultError::Storage { source, .. } => match source {
                StorageError::Io(_) => ErrorKind::Io,
                _ => ErrorKind::Internal,
            },
            VaultError::NotOpen | VaultError::Halted => ErrorKind::State,
            VaultError::Config(_) => ErrorKind::Validation,
            VaultError::LockPoisoned => ErrorKind::Internal,
        }
    }

    /// Map a storage failure, surfacing input rejections as their own kinds
    fn storage(operation: &'static str) -> impl FnOnce(StorageError) -> VaultError {
        move |source| match source {
            StorageError::Validation(e) => VaultError::Validation(e),
            StorageError::Security(s) => VaultError::Security(s),
            source => VaultError::Storage { operation, source },
        }
    }

    fn container(operation: &'static str) -> impl FnOnce(ContainerError) -> VaultError {
        move |source| match source {
            ContainerError::Integrity(e) => VaultError::Integrity(e),
            source => VaultError::Container { operation, source },
        }
    }
}

/// Facade result type
pub type Result<T> = std::result::Result<T, VaultError>;

// ============================================================================
// STATE
// ============================================================================

/// Envelope handle and key held while the vault is open
struct Sealer {
    container: EncryptedContainer,
    key: DerivedKey,
}

struct OpenVault {
    storage: Storage,
    /// `None` when encryption is disabled
    sealer: Option<Sealer>,
}

enum VaultState {
    Closed,
    Open(OpenVault),
    Halted,
}

// ============================================================================
// VAULT
// ============================================================================

/// Encrypted, deduplicated, full-text-searchable memory store.
///
/// All methods take `&self`; the vault is `Send + Sync` and can be shared
/// behind an `Arc`.
pub struct MemoryVault {
    config: VaultConfig,
    /// Injected signals; `None` reads the running host
    signals: Option<Box<dyn EnvironmentSignals>>,
    state: RwLock<VaultState>,
}

impl MemoryVault {
    /// Vault keyed to the running host
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            signals: None,
            state: RwLock::new(VaultState::Closed),
        }
    }

    /// Vault keyed to the given signals provider
    pub fn with_signals(config: VaultConfig, signals: impl EnvironmentSignals + 'static) -> Self {
        Self {
            config,
            signals: Some(Box::new(signals)),
            state: RwLock::new(VaultState::Closed),
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Resolved file locations, `None` when no data directory can be found
    pub fn paths(&self) -> Option<VaultPaths> {
        self.config
            .resolve_data_dir()
            .map(|dir| VaultPaths::new(&dir, &self.config.db_file_name))
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state.read().as_deref(), Ok(VaultState::Open(_)))
    }

    /// Open the store: decrypt and verify the envelope, then run migrations.
    ///
    /// A no-op if already open. An integrity failure halts the vault and
    /// every later call fails with [`VaultError::Halted`].
    pub fn initialize(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| VaultError::LockPoisoned)?;
        match *state {
            VaultState::Open(_) => return Ok(()),
            VaultState::Halted => return Err(VaultError::Halted),
            VaultState::Closed => {}
        }

        match self.open_store() {
            Ok(open) => {
                *state = VaultState::Open(open);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Integrity => {
                tracing::error!("Refusing to open vault: {}", e);
                *state = VaultState::Halted;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    fn open_store(&self) -> Result<OpenVault> {
        let data_dir = self.config.resolve_data_dir().ok_or_else(|| {
            VaultError::Config("Could not determine project directories".to_string())
        })?;
        ensure_private_dir(&data_dir)?;
        let data_dir = std::fs::canonicalize(&data_dir)?;
        let paths = VaultPaths::new(&data_dir, &self.config.db_file_name);
        let validator = self.config.validator()?;

        let sealer = if self.config.encryption {
            let key = match &self.signals {
                Some(signals) => derive_key(signals.as_ref()),
                None => derive_key(&SystemSignals::new(data_dir.display().to_string())),
            };
            let container = EncryptedContainer::new(&paths.envelope, &paths.working_db);
            let outcome = match container.open_to_working_file(&key) {
                Ok(outcome) => outcome,
                Err(ContainerError::Integrity(e)) => return Err(VaultError::Integrity(e)),
                Err(e @ (ContainerError::Malformed(_) | ContainerError::Unsupported { .. })) => {
                    return Err(VaultError::Envelope(e));
                }
                Err(e) => return Err(VaultError::container("initialize")(e)),
            };
            tracing::debug!(?outcome, "Envelope opened");
            Some(Sealer { container, key })
        } else {
            // A plaintext store here would later be sealed over the envelope
            if paths.envelope.exists() {
                return Err(VaultError::Config(format!(
                    "encryption is disabled but {} exists; enable encryption to open this store",
                    paths.envelope.display()
                )));
            }
            None
        };

        let storage = match Storage::open(&paths.working_db, validator) {
            Ok(storage) => storage,
            Err(e) => {
                // Do not leave decrypted bytes behind
                if let Some(sealer) = &sealer {
                    if let Err(seal_err) = sealer.container.seal_working_file(&sealer.key) {
                        tracing::warn!("Failed to reseal after open failure: {}", seal_err);
                    }
                }
                return Err(VaultError::storage("initialize")(e));
            }
        };

        tracing::info!(
            path = %paths.data_dir.display(),
            encrypted = sealer.is_some(),
            "Memory vault opened"
        );
        Ok(OpenVault { storage, sealer })
    }

    fn with_storage<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Storage) -> std::result::Result<T, StorageError>,
    ) -> Result<T> {
        let state = self.state.read().map_err(|_| VaultError::LockPoisoned)?;
        match &*state {
            VaultState::Open(open) => f(&open.storage).map_err(VaultError::storage(operation)),
            VaultState::Closed => Err(VaultError::NotOpen),
            VaultState::Halted => Err(VaultError::Halted),
        }
    }

    // ========================================================================
    // OPERATIONS
    // ========================================================================

    /// Store a memory and return its id.
    ///
    /// Identical content maps to the existing record, which is overwritten
    /// with the new labels and keeps its id.
    pub fn store_memory(&self, request: StoreRequest) -> Result<u64> {
        self.with_storage("store_memory", |storage| storage.put(request))
    }

    /// Shorthand for [`Self::store_memory`]; labels default to `general`
    pub fn remember(
        &self,
        content: &str,
        context: Option<&str>,
        record_type: Option<&str>,
    ) -> Result<u64> {
        let mut request = StoreRequest::new(content);
        if let Some(context) = context {
            request = request.context(context);
        }
        if let Some(record_type) = record_type {
            request = request.record_type(record_type);
        }
        self.store_memory(request)
    }

    /// Ranked keyword search.
    ///
    /// `limit` must be within 1..=100. Results are in index rank order and
    /// below-floor results are dropped after the limit is applied.
    pub fn search_memories(
        &self,
        query: &str,
        limit: usize,
        filters: SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(ValidationError::InvalidQuery("must be non-empty string".into()).into());
        }
        validate_limit(limit)?;
        if sanitize_fts5_query(query).is_empty() {
            return Err(ValidationError::InvalidQuery("no searchable terms".into()).into());
        }

        let mut search = SearchQuery::new(query, limit);
        search.filters = filters;
        search.min_relevance = self.config.default_min_relevance;
        self.with_storage("search_memories", |storage| storage.search(&search))
    }

    pub fn get_memory_by_id(&self, id: u64) -> Result<Option<Record>> {
        self.with_storage("get_memory_by_id", |storage| storage.get_by_id(id))
    }

    /// Delete a memory; `false` if it did not exist
    pub fn delete_memory(&self, id: u64) -> Result<bool> {
        self.with_storage("delete_memory", |storage| storage.delete_by_id(id))
    }

    pub fn get_stats(&self) -> Result<Stats> {
        self.with_storage("get_stats", Storage::stats)
    }

    /// Newest records first
    pub fn list_memories(&self, limit: usize, offset: usize) -> Result<Vec<Record>> {
        self.with_storage("list_memories", |storage| storage.list(limit, offset))
    }

    /// Check that every record has exactly one index entry and vice versa
    pub fn verify_index(&self) -> Result<IndexReport> {
        self.with_storage("verify_index", Storage::verify_index)
    }

    /// Seal and close. A no-op when already closed or halted.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.write().map_err(|_| VaultError::LockPoisoned)?;
        match std::mem::replace(&mut *state, VaultState::Closed) {
            VaultState::Open(open) => Self::seal(open),
            VaultState::Closed => Ok(()),
            VaultState::Halted => {
                *state = VaultState::Halted;
                Ok(())
            }
        }
    }

    fn seal(open: OpenVault) -> Result<()> {
        let OpenVault { storage, sealer } = open;

        // Seal even if the checkpoint failed; the connections are gone either way
        let closed = storage.close().map_err(VaultError::storage("close"));
        if let Err(e) = &closed {
            tracing::warn!("Storage close failed: {}", e);
        }

        if let Some(sealer) = sealer {
            sealer
                .container
                .seal_working_file(&sealer.key)
                .map_err(VaultError::container("close"))?;
        }

        tracing::info!("Memory vault closed");
        closed
    }
}

impl Drop for MemoryVault {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let VaultState::Open(open) = std::mem::replace(state, VaultState::Closed) {
            if let Err(e) = Self::seal(open) {
                tracing::warn!("Failed to seal vault on drop: {}", e);
            }
        }
    }
}

/// Create the directory and restrict it to the owner on Unix
fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        let _ = std::fs::set_permissions(dir, perms);
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
