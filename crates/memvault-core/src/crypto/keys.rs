//! Machine-bound key derivation
//!
//! The envelope key is never stored. It is re-derived on every open from a
//! fingerprint of the host, so a copied envelope is useless elsewhere.
//!
//! Flow:
//!   1. An [`EnvironmentSignals`] provider reports the host's identity signals
//!   2. [`fingerprint`] joins them into one string
//!   3. [`derive_key`] runs PBKDF2-HMAC-SHA256 over the fingerprint with a
//!      fixed, versioned salt and returns a zeroizing 32-byte key

use sha2::{Digest, Sha256};
use sysinfo::{Networks, System};
use zeroize::Zeroizing;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count
pub const PBKDF2_ITERATIONS: u32 = 200_000;

/// Salt label. Bump the version suffix to rotate every derived key.
const SALT_LABEL: &str = "memvault-envelope-salt-v1";

/// Tag written into envelopes so a future scheme change is detectable
pub const KEY_DERIVATION_TAG: &str = "pbkdf2-sha256-200000-v1";

/// Fingerprint field separator
const FINGERPRINT_DELIMITER: &str = ":";

/// Stand-in when no usable network interface is found
const NO_MAC_PLACEHOLDER: &str = "no-mac";

/// Stand-in for any other signal the host does not report
const UNKNOWN: &str = "unknown";

/// A 256-bit symmetric key, wiped from memory on drop
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

// ─── Signals ─────────────────────────────────────────────────────────────────

/// Host identity signals feeding the fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineSignals {
    pub hostname: String,
    pub platform: String,
    pub arch: String,
    pub cpu_model: String,
    /// Non-loopback MAC addresses; order does not matter
    pub mac_addresses: Vec<String>,
    pub total_memory: u64,
    pub user_name: String,
    /// Separates two stores on the same machine (the store directory)
    pub disambiguator: String,
}

/// Source of machine identity signals.
///
/// Production uses [`SystemSignals`]; tests inject a fixed provider so key
/// derivation is deterministic.
pub trait EnvironmentSignals: Send + Sync {
    fn collect(&self) -> MachineSignals;
}

/// Reads signals from the running host
#[derive(Debug, Clone)]
pub struct SystemSignals {
    disambiguator: String,
}

impl SystemSignals {
    pub fn new(disambiguator: impl Into<String>) -> Self {
        Self {
            disambiguator: disambiguator.into(),
        }
    }

    fn mac_addresses() -> Vec<String> {
        let networks = Networks::new_with_refreshed_list();
        networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .map(|(_, data)| data.mac_address())
            .filter(|mac| !mac.is_unspecified())
            .map(|mac| mac.to_string())
            .collect()
    }

    fn user_name() -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| UNKNOWN.to_string())
    }
}

impl EnvironmentSignals for SystemSignals {
    fn collect(&self) -> MachineSignals {
        let mut sys = System::new();
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| UNKNOWN.to_string());

        MachineSignals {
            hostname,
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_model,
            mac_addresses: Self::mac_addresses(),
            total_memory: sys.total_memory(),
            user_name: Self::user_name(),
            disambiguator: self.disambiguator.clone(),
        }
    }
}

fn is_loopback(interface: &str) -> bool {
    let lower = interface.to_ascii_lowercase();
    lower == "lo" || lower.starts_with("lo0") || lower.contains("loopback")
}

// ─── Derivation ──────────────────────────────────────────────────────────────

/// Join the signals into the fingerprint string
pub fn fingerprint(signals: &MachineSignals) -> String {
    let mut macs: Vec<&str> = signals
        .mac_addresses
        .iter()
        .map(String::as_str)
        .filter(|m| !m.is_empty())
        .collect();
    macs.sort_unstable();
    macs.dedup();

    let macs = if macs.is_empty() {
        tracing::warn!("No usable network interface found; key fingerprint uses placeholder");
        NO_MAC_PLACEHOLDER.to_string()
    } else {
        macs.join(",")
    };
    let memory = signals.total_memory.to_string();

    [
        signals.hostname.as_str(),
        signals.platform.as_str(),
        signals.arch.as_str(),
        signals.cpu_model.as_str(),
        macs.as_str(),
        memory.as_str(),
        signals.user_name.as_str(),
        signals.disambiguator.as_str(),
    ]
    .join(FINGERPRINT_DELIMITER)
}

/// Salt = SHA-256(SALT_LABEL)
fn salt() -> [u8; 32] {
    Sha256::digest(SALT_LABEL.as_bytes()).into()
}

/// Derive the envelope key for the current machine
pub fn derive_key(signals: &dyn EnvironmentSignals) -> DerivedKey {
    let fingerprint = Zeroizing::new(fingerprint(&signals.collect()));
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        fingerprint.as_bytes(),
        &salt(),
        PBKDF2_ITERATIONS,
        key.as_mut_slice(),
    );
    tracing::debug!("Derived machine-bound envelope key");
    key
}
