//! Persisted per-store configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cairn_core::digest::HashAlgorithm;
use cairn_core::error::StoreError;

/// Default grace window protecting recently used entries from eviction.
const DEFAULT_GRACE_SECS: u64 = 600;

/// Digest section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSection {
    /// Algorithm name, e.g. `sha256`.
    pub name: HashAlgorithm,
    /// Digest length in bytes; derived from `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

/// Configuration persisted as `config.yml` at the store root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Digest algorithm every key in this store uses.
    pub hash: HashSection,
    /// Upper bound on stored payload bytes; absence disables the budget
    /// and eviction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Bytes of free disk space to keep in reserve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_disk_size: Option<u64>,
    /// Seconds after the last access during which an entry is safe from
    /// eviction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_window_secs: Option<u64>,
}

impl DiskConfig {
    /// Config with the given algorithm and no budgets.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            hash: HashSection { name: algorithm, length: Some(algorithm.digest_len()) },
            max_size: None,
            free_disk_size: None,
            grace_window_secs: None,
        }
    }

    /// Set the payload byte budget.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Set the free-disk reserve.
    pub fn with_free_disk_size(mut self, reserve: u64) -> Self {
        self.free_disk_size = Some(reserve);
        self
    }

    /// Set the eviction grace window.
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window_secs = Some(window.as_secs());
        self
    }

    /// The digest algorithm of the store.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.hash.name
    }

    /// Grace window as a duration.
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs.unwrap_or(DEFAULT_GRACE_SECS))
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), StoreError> {
        if let Some(length) = self.hash.length {
            if length != self.hash.name.digest_len() {
                return Err(StoreError::Config(format!(
                    "declared digest length {length} does not match {} ({} bytes)",
                    self.hash.name,
                    self.hash.name.digest_len()
                )));
            }
        }
        Ok(())
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| StoreError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist to a config file.
    pub fn store(&self, path: &Path) -> Result<(), StoreError> {
        let text = serde_yaml::to_string(self)
            .map_err(|e| StoreError::Config(format!("cannot serialize config: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }
}
