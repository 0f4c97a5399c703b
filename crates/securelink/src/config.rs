//! Vault configuration.

use std::time::Duration;

use crate::error::{Result, VaultError};

/// Environment variable overriding [`VaultConfig::storage_timeout`], in ms.
pub const ENV_STORAGE_TIMEOUT_MS: &str = "SECURELINK_STORAGE_TIMEOUT_MS";

/// Environment variable overriding [`VaultConfig::max_upload_bytes`].
pub const ENV_MAX_UPLOAD_BYTES: &str = "SECURELINK_MAX_UPLOAD_BYTES";

/// Configuration for the Vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Upper bound on any single storage call.
    pub storage_timeout: Duration,
    /// Largest accepted upload, in plaintext bytes.
    pub max_upload_bytes: u64,
    /// How many fresh ids to try before giving up on a link creation.
    pub id_attempts: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            max_upload_bytes: 50 * 1024 * 1024,
            id_attempts: 3,
        }
    }
}

impl VaultConfig {
    /// Defaults overlaid with any `SECURELINK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_STORAGE_TIMEOUT_MS) {
            let ms = parse_positive(ENV_STORAGE_TIMEOUT_MS, &raw)?;
            config.storage_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_BYTES) {
            config.max_upload_bytes = parse_positive(ENV_MAX_UPLOAD_BYTES, &raw)?;
        }

        Ok(config)
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(VaultError::InvalidConfig(format!(
            "{} must be a positive integer, got {:?}",
            key, raw
        ))),
        Ok(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.storage_timeout, Duration::from_secs(5));
        assert_eq!(config.max_upload_bytes, 52_428_800);
    }

    #[test]
    fn test_overrides() {
        let config = VaultConfig::from_lookup(lookup(&[
            (ENV_STORAGE_TIMEOUT_MS, "250"),
            (ENV_MAX_UPLOAD_BYTES, " 1024 "),
        ]))
        .unwrap();

        assert_eq!(config.storage_timeout, Duration::from_millis(250));
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn test_rejects_bad_values() {
        for bad in ["0", "-5", "soon", ""] {
            let result = VaultConfig::from_lookup(lookup(&[(ENV_STORAGE_TIMEOUT_MS, bad)]));
            assert!(matches!(result, Err(VaultError::InvalidConfig(_))), "accepted {:?}", bad);
        }
    }
}
