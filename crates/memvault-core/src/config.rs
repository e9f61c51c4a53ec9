//! Vault configuration
//!
//! Plain serde struct with defaults, an environment overlay and the platform
//! data directory as fallback.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::memory::{ContentValidator, ValidationError, DEFAULT_SECRET_PATTERNS, MAX_CONTENT_CHARS};

/// Overrides the data directory
pub const ENV_DATA_DIR: &str = "MEMVAULT_DATA_DIR";

/// Any of `1`, `true`, `yes` keeps the store as a plain SQLite file
pub const ENV_DISABLE_ENCRYPTION: &str = "MEMVAULT_DISABLE_ENCRYPTION";

/// Default database file name inside the data directory
pub const DEFAULT_DB_FILE_NAME: &str = "memories.db";

/// Suffix appended to the database file name for the envelope
pub const ENVELOPE_SUFFIX: &str = ".enc";

/// Default relevance floor for facade searches
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.1;

/// A named secret-detection pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPattern {
    pub name: String,
    pub regex: String,
}

/// Configuration for a [`crate::MemoryVault`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VaultConfig {
    /// Store directory; `None` uses the platform data directory
    pub data_dir: Option<PathBuf>,
    pub db_file_name: String,
    /// Seal the store into an envelope on close
    pub encryption: bool,
    pub max_content_chars: usize,
    pub default_min_relevance: f64,
    pub secret_patterns: Vec<SecretPattern>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            encryption: true,
            max_content_chars: MAX_CONTENT_CHARS,
            default_min_relevance: DEFAULT_MIN_RELEVANCE,
            secret_patterns: DEFAULT_SECRET_PATTERNS
                .iter()
                .map(|(name, regex)| SecretPattern {
                    name: (*name).to_string(),
                    regex: (*regex).to_string(),
                })
                .collect(),
        }
    }
}

impl VaultConfig {
    /// Defaults rooted at an explicit directory
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `MEMVAULT_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(flag) = std::env::var(ENV_DISABLE_ENCRYPTION) {
            if parse_flag(&flag) {
                tracing::warn!("Envelope encryption disabled by {}", ENV_DISABLE_ENCRYPTION);
                config.encryption = false;
            }
        }
        config
    }

    /// Resolve the store directory, falling back to the platform data dir
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        match &self.data_dir {
            Some(dir) => Some(dir.clone()),
            None => ProjectDirs::from("com", "memvault", "core")
                .map(|dirs| dirs.data_dir().to_path_buf()),
        }
    }

    /// Build the content validator this config describes
    pub fn validator(&self) -> Result<ContentValidator, ValidationError> {
        ContentValidator::new(
            self.max_content_chars,
            self.secret_patterns
                .iter()
                .map(|p| (p.name.as_str(), p.regex.as_str())),
        )
    }
}

/// Resolved on-disk locations of one store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub data_dir: PathBuf,
    /// Plaintext SQLite file, present only while the vault is open
    pub working_db: PathBuf,
    /// Sealed envelope, present while the vault is closed
    pub envelope: PathBuf,
}

impl VaultPaths {
    pub fn new(data_dir: &Path, db_file_name: &str) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            working_db: data_dir.join(db_file_name),
            envelope: data_dir.join(format!("{}{}", db_file_name, ENVELOPE_SUFFIX)),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
