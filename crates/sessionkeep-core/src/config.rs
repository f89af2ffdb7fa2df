//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which selects the durable storage backend and the start-up expiration
//! margin.
//!
//! Configuration is stored at `~/.config/sessionkeep/config.json`. The
//! `SESSIONKEEP_STORAGE` and `SESSIONKEEP_EXPIRATION_MARGIN_MS` environment
//! variables override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::DEFAULT_EXPIRATION_MARGIN_MS;
use crate::storage::keychain::DEFAULT_SERVICE_NAME;
use crate::storage::{DurableStore, FileStorage, KeyringStorage, MemoryStorage};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sessionkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const STORAGE_ENV: &str = "SESSIONKEEP_STORAGE";
const MARGIN_ENV: &str = "SESSIONKEEP_EXPIRATION_MARGIN_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageBackend,
    pub expiration_margin_ms: i64,
    pub storage_dir: Option<PathBuf>,
    pub keyring_service: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            expiration_margin_ms: DEFAULT_EXPIRATION_MARGIN_MS,
            storage_dir: None,
            keyring_service: DEFAULT_SERVICE_NAME.to_string(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when absent) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(STORAGE_ENV) {
            match value.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", STORAGE_ENV),
            }
        }
        if let Some(value) = lookup(MARGIN_ENV) {
            match value.trim().parse() {
                Ok(ms) => self.expiration_margin_ms = ms,
                Err(e) => warn!(error = %e, value = %value, "Ignoring {}", MARGIN_ENV),
            }
        }
    }

    /// Directory holding `session.json` for the file backend.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn expiration_margin(&self) -> Duration {
        Duration::milliseconds(self.expiration_margin_ms)
    }

    /// Open the configured durable storage backend.
    pub fn open_storage(&self) -> Result<Box<dyn DurableStore>> {
        Ok(match self.storage {
            StorageBackend::Memory => Box::new(MemoryStorage::new()),
            StorageBackend::File => {
                let dir = self.storage_dir()?;
                let storage = FileStorage::open(&dir)
                    .with_context(|| format!("Failed to open session storage in {}", dir.display()))?;
                Box::new(storage)
            }
            StorageBackend::Keyring => Box::new(KeyringStorage::new(self.keyring_service.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.expiration_margin(), Duration::milliseconds(6000));
        assert_eq!(config.keyring_service, "sessionkeep");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage":"keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.expiration_margin_ms, DEFAULT_EXPIRATION_MARGIN_MS);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[(STORAGE_ENV, "Memory"), (MARGIN_ENV, " 0 ")]));
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.expiration_margin_ms, 0);
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[(STORAGE_ENV, "redis"), (MARGIN_ENV, "soon")]));
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.expiration_margin_ms, DEFAULT_EXPIRATION_MARGIN_MS);
    }

    #[test]
    fn test_open_file_storage_in_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let mut storage = config.open_storage().unwrap();
        storage.set("token", "abc").unwrap();
        assert!(dir.path().join("session.json").exists());
    }
}
