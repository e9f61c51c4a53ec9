//! Integrity Guard
//!
//! SHA-256 digests for two jobs: the dedup key of a record's content and the
//! tamper check over a whole decrypted store file.

use sha2::{Digest, Sha256};

/// Digest mismatch on a verified payload. Fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Integrity check failed: expected {expected}, computed {actual} (possible tampering or corruption)")]
pub struct IntegrityError {
    pub expected: String,
    pub actual: String,
}

/// Hex SHA-256 of a record's content, used as the dedup key
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

/// Hex SHA-256 of arbitrary bytes
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Recompute the digest of `data` and compare it with `expected`
pub fn verify(data: &[u8], expected: &str) -> Result<(), IntegrityError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(IntegrityError {
            expected: expected.to_string(),
            actual,
        })
    }
}
