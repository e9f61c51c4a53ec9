//! Encrypted Container
//!
//! Wraps the whole SQLite store file in an on-disk envelope:
//! - AES-256-CTR over the plaintext with a fresh 16-byte IV per seal
//! - SHA-256 of the *plaintext* stored alongside, checked after decryption
//! - Envelope replaced atomically (temp file + rename) before the plaintext
//!   working file is removed
//!
//! CTR mode alone gives no authentication. Tampering is caught by the
//! plaintext digest: a flipped ciphertext bit flips the same plaintext bit,
//! and a wrong key yields garbage, so either way the digest no longer matches.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use aes::Aes256;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::integrity::{self, IntegrityError};
use super::keys::{KEY_DERIVATION_TAG, KEY_LEN};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Cipher identifier written into envelopes
pub const ALGORITHM: &str = "aes-256-ctr";

/// Envelope format version
pub const ENVELOPE_VERSION: u32 = 1;

/// IV length in bytes
pub const IV_LEN: usize = 16;

/// SQLite files that can sit next to the working database
const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];

/// Marks a working file as belonging to an open, not yet sealed session
const UNSEALED_MARKER_SUFFIX: &str = ".unsealed";

// ============================================================================
// ERRORS
// ============================================================================

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Decrypted bytes do not match the stored digest
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Envelope could not be parsed or decoded
    #[error("Malformed envelope: {0}")]
    Malformed(String),
    /// Envelope written by a scheme this build does not implement
    #[error("Unsupported envelope {field}: {value}")]
    Unsupported { field: &'static str, value: String },
    /// A working file sits next to the envelope but no session left it there
    #[error("Working file {} is not from an unsealed session; refusing to replace the envelope", .0.display())]
    UnclaimedWorkingFile(PathBuf),
}

impl From<serde_json::Error> for ContainerError {
    fn from(e: serde_json::Error) -> Self {
        ContainerError::Malformed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;

// ============================================================================
// ENVELOPE
// ============================================================================

/// On-disk representation of the sealed store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 IV
    pub iv: String,
    /// Hex SHA-256 of the plaintext
    pub integrity_hash: String,
    pub algorithm: String,
    pub key_derivation: String,
    pub version: u32,
}

impl Envelope {
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.ciphertext)
            .map_err(|e| ContainerError::Malformed(format!("ciphertext: {}", e)))
    }

    pub fn iv_bytes(&self) -> Result<[u8; IV_LEN]> {
        let raw = BASE64
            .decode(&self.iv)
            .map_err(|e| ContainerError::Malformed(format!("iv: {}", e)))?;
        raw.try_into().map_err(|raw: Vec<u8>| {
            ContainerError::Malformed(format!("iv must be {} bytes, got {}", IV_LEN, raw.len()))
        })
    }
}

fn apply_keystream(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], buf: &mut [u8]) -> Result<()> {
    let mut cipher = Aes256Ctr::new_from_slices(key, iv)
        .map_err(|e| ContainerError::Malformed(format!("cipher init: {}", e)))?;
    cipher.apply_keystream(buf);
    Ok(())
}

/// Encrypt `plaintext` into a new envelope
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Envelope> {
    let integrity_hash = integrity::hash_bytes(plaintext);

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut buf = plaintext.to_vec();
    apply_keystream(key, &iv, &mut buf)?;

    Ok(Envelope {
        ciphertext: BASE64.encode(&buf),
        iv: BASE64.encode(iv),
        integrity_hash,
        algorithm: ALGORITHM.to_string(),
        key_derivation: KEY_DERIVATION_TAG.to_string(),
        version: ENVELOPE_VERSION,
    })
}

/// Decrypt an envelope and verify the plaintext digest
pub fn open(key: &[u8; KEY_LEN], envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(ContainerError::Unsupported {
            field: "version",
            value: envelope.version.to_string(),
        });
    }
    if envelope.algorithm != ALGORITHM {
        return Err(ContainerError::Unsupported {
            field: "algorithm",
            value: envelope.algorithm.clone(),
        });
    }
    if envelope.key_derivation != KEY_DERIVATION_TAG {
        return Err(ContainerError::Unsupported {
            field: "keyDerivation",
            value: envelope.key_derivation.clone(),
        });
    }

    let iv = envelope.iv_bytes()?;
    let mut buf = Zeroizing::new(envelope.ciphertext_bytes()?);
    apply_keystream(key, &iv, &mut buf)?;

    integrity::verify(&buf, &envelope.integrity_hash)?;
    Ok(buf)
}

// ============================================================================
// FILE LIFECYCLE
// ============================================================================

/// What [`EncryptedContainer::open_to_working_file`] found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No envelope yet; the store starts empty
    FirstRun,
    /// Envelope decrypted into a fresh working file
    Decrypted,
    /// A working file from an interrupted session was kept
    Recovered,
}

/// The envelope/working-file pair governing one store
#[derive(Debug, Clone)]
pub struct EncryptedContainer {
    envelope_path: PathBuf,
    working_path: PathBuf,
}

impl EncryptedContainer {
    pub fn new(envelope_path: impl Into<PathBuf>, working_path: impl Into<PathBuf>) -> Self {
        Self {
            envelope_path: envelope_path.into(),
            working_path: working_path.into(),
        }
    }

    pub fn envelope_path(&self) -> &Path {
        &self.envelope_path
    }

    pub fn working_path(&self) -> &Path {
        &self.working_path
    }

    pub fn has_envelope(&self) -> bool {
        self.envelope_path.exists()
    }

    /// Present from `open_to_working_file` until the next successful seal
    pub fn marker_path(&self) -> PathBuf {
        let mut path = self.working_path.clone().into_os_string();
        path.push(UNSEALED_MARKER_SUFFIX);
        PathBuf::from(path)
    }

    /// Written before any plaintext so a crash always leaves it behind
    fn mark_unsealed(&self) -> Result<()> {
        let marker = fs::File::create(self.marker_path())?;
        marker.sync_all()?;
        restrict_permissions(&self.marker_path());
        Ok(())
    }

    fn clear_marker(&self) {
        let marker = self.marker_path();
        if marker.exists() {
            if let Err(e) = fs::remove_file(&marker) {
                tracing::warn!(path = %marker.display(), "Failed to remove unsealed marker: {}", e);
            }
        }
    }

    pub fn read_envelope(&self) -> Result<Envelope> {
        let raw = fs::read(&self.envelope_path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Write an envelope via temp file + rename so a crash never leaves a
    /// half-written envelope at the final path
    pub fn write_envelope(&self, envelope: &Envelope) -> Result<()> {
        let dir = self
            .envelope_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::Builder::new()
            .prefix(".envelope-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, envelope)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.envelope_path)
            .map_err(|e| ContainerError::Io(e.error))?;
        Ok(())
    }

    /// Materialize the plaintext working file from the envelope.
    ///
    /// A working file next to a valid envelope is kept only if the unsealed
    /// marker shows it was left by an interrupted session; otherwise it could
    /// be an unrelated plaintext store and sealing it would discard the
    /// envelope, so opening fails with [`ContainerError::UnclaimedWorkingFile`].
    pub fn open_to_working_file(&self, key: &[u8; KEY_LEN]) -> Result<OpenOutcome> {
        if !self.has_envelope() {
            self.mark_unsealed()?;
            if self.working_path.exists() {
                tracing::warn!(
                    path = %self.working_path.display(),
                    "Found unsealed working file without envelope; adopting it"
                );
                return Ok(OpenOutcome::Recovered);
            }
            tracing::info!("No envelope found, starting a new store");
            return Ok(OpenOutcome::FirstRun);
        }

        // Verify the envelope even if a leftover working file wins, so a
        // tampered envelope is never silently ignored
        let envelope = self.read_envelope()?;
        let plaintext = open(key, &envelope)?;

        if self.working_path.exists() {
            if !self.marker_path().exists() {
                return Err(ContainerError::UnclaimedWorkingFile(self.working_path.clone()));
            }
            tracing::warn!(
                path = %self.working_path.display(),
                "Working file from an interrupted session is newer than the envelope; keeping it"
            );
            return Ok(OpenOutcome::Recovered);
        }

        self.mark_unsealed()?;
        fs::write(&self.working_path, plaintext.as_slice())?;
        restrict_permissions(&self.working_path);
        tracing::info!("Envelope decrypted and integrity verified");
        Ok(OpenOutcome::Decrypted)
    }

    /// Seal the working file into the envelope and remove the plaintext.
    ///
    /// Returns `false` when there was no working file to seal.
    pub fn seal_working_file(&self, key: &[u8; KEY_LEN]) -> Result<bool> {
        if !self.working_path.exists() {
            tracing::debug!("No working file to seal");
            self.clear_marker();
            return Ok(false);
        }

        let plaintext = Zeroizing::new(fs::read(&self.working_path)?);
        let envelope = seal(key, &plaintext)?;
        self.write_envelope(&envelope)?;

        fs::remove_file(&self.working_path)?;
        self.remove_sidecars();
        self.clear_marker();
        tracing::info!(bytes = plaintext.len(), "Store sealed");
        Ok(true)
    }

    /// Best-effort removal of SQLite journal files next to the working file
    pub fn remove_sidecars(&self) {
        for suffix in SIDECAR_SUFFIXES {
            let mut path = self.working_path.clone().into_os_string();
            path.push(suffix);
            let path = PathBuf::from(path);
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), "Failed to remove stale file: {}", e);
                }
            }
        }
    }
}

/// Owner-only permissions on Unix
pub(crate) fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(path, perms);
    }
    #[cfg(not(unix))]
    let _ = path;
}
