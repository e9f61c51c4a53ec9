//! Test Vault
//!
//! Provides isolated vault instances for testing:
//! - Temporary store directories that are cleaned up on drop
//! - A fixed machine fingerprint so keys are reproducible
//! - Close/reopen cycles against the same directory

use std::path::{Path, PathBuf};

use memvault_core::{
    EnvironmentSignals, MachineSignals, MemoryVault, StoreRequest, VaultConfig, VaultPaths,
};
use tempfile::TempDir;

/// Deterministic signals provider
#[derive(Debug, Clone)]
pub struct FixedSignals(pub MachineSignals);

impl FixedSignals {
    /// The fingerprint every harness vault uses unless told otherwise
    pub fn default_host() -> Self {
        Self(MachineSignals {
            hostname: "e2e-host".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            cpu_model: "E2E Virtual CPU".into(),
            mac_addresses: vec!["02:00:00:00:00:01".into()],
            total_memory: 8 * 1024 * 1024 * 1024,
            user_name: "e2e".into(),
            disambiguator: "e2e-store".into(),
        })
    }

    /// Same host with a different name
    pub fn other_host() -> Self {
        Self(MachineSignals {
            hostname: "someone-elses-laptop".into(),
            ..Self::default_host().0
        })
    }
}

impl EnvironmentSignals for FixedSignals {
    fn collect(&self) -> MachineSignals {
        self.0.clone()
    }
}

/// Manager for test vaults
///
/// Each instance owns a temp directory; the vault inside is opened on
/// creation.
///
/// # Example
///
/// ```rust,ignore
/// let tv = TestVault::open();
/// tv.vault.remember("hello", None, None)?;
/// let tv = tv.reopen();
/// ```
pub struct TestVault {
    /// The vault under test
    pub vault: MemoryVault,
    config: VaultConfig,
    signals: FixedSignals,
    /// Kept alive so the directory outlives the vault
    _temp_dir: TempDir,
}

impl TestVault {
    /// Open a fresh encrypted vault in a temporary directory
    pub fn open() -> Self {
        Self::open_with(|_| {})
    }

    /// Open a fresh vault after adjusting its config
    pub fn open_with(adjust: impl FnOnce(&mut VaultConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = VaultConfig::at(temp_dir.path());
        adjust(&mut config);

        let signals = FixedSignals::default_host();
        let vault = MemoryVault::with_signals(config.clone(), signals.clone());
        vault.initialize().expect("Failed to initialize test vault");

        Self {
            vault,
            config,
            signals,
            _temp_dir: temp_dir,
        }
    }

    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }

    pub fn paths(&self) -> VaultPaths {
        self.vault.paths().expect("Test vault has an explicit directory")
    }

    pub fn envelope_path(&self) -> PathBuf {
        self.paths().envelope
    }

    pub fn working_path(&self) -> PathBuf {
        self.paths().working_db
    }

    /// Close the current vault and open a new instance on the same directory
    pub fn reopen(self) -> Self {
        self.vault.close().expect("Failed to close test vault");
        let vault = MemoryVault::with_signals(self.config.clone(), self.signals.clone());
        vault.initialize().expect("Failed to reopen test vault");
        Self { vault, ..self }
    }

    /// A second, unopened vault over the same directory with other signals
    pub fn sibling(&self, signals: FixedSignals) -> MemoryVault {
        MemoryVault::with_signals(self.config.clone(), signals)
    }

    /// Store `count` distinct memories and return their ids
    pub fn seed(&self, count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| {
                self.vault
                    .store_memory(crate::TestDataFactory::request(i))
                    .expect("Failed to seed memory")
            })
            .collect()
    }

    pub fn store(&self, content: &str) -> u64 {
        self.vault
            .store_memory(StoreRequest::new(content))
            .expect("Failed to store memory")
    }

    pub fn count(&self) -> u64 {
        self.vault
            .get_stats()
            .map(|s| s.total_records)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_opens_and_reopens() {
        let tv = TestVault::open();
        let ids = tv.seed(3);
        assert_eq!(tv.count(), 3);

        let tv = tv.reopen();
        assert_eq!(tv.count(), 3);
        assert!(tv.vault.get_memory_by_id(ids[0]).unwrap().is_some());
    }
}
