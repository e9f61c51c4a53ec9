//! Crypto Module
//!
//! At-rest protection for the store file:
//! - Machine-bound PBKDF2 key derivation
//! - SHA-256 integrity digests (also the dedup key)
//! - AES-256-CTR envelope with atomic replacement

pub mod container;
pub mod integrity;
pub mod keys;

pub use container::{ContainerError, EncryptedContainer, Envelope, OpenOutcome};
pub use integrity::{hash_bytes, hash_content, IntegrityError};
pub use keys::{
    derive_key, fingerprint, DerivedKey, EnvironmentSignals, MachineSignals, SystemSignals,
    KEY_DERIVATION_TAG, KEY_LEN, PBKDF2_ITERATIONS,
};
