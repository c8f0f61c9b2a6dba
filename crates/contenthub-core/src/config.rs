//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! which backend to talk to, where tokens live, request timeouts and the
//! last email used to sign in.
//!
//! Configuration is stored at `~/.config/contenthub/config.json`. The
//! `CONTENTHUB_API_URL` and `CONTENTHUB_EMAIL` environment variables take
//! precedence over the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ClientOptions, DEFAULT_BASE_URL};
use crate::auth::{FileTokenStore, KeyringTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "contenthub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "CONTENTHUB_API_URL";
pub const ENV_EMAIL: &str = "CONTENTHUB_EMAIL";
pub const ENV_PASSWORD: &str = "CONTENTHUB_PASSWORD";

/// Where the session tokens are persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

impl FromStr for TokenBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenBackend::File),
            "keyring" => Ok(TokenBackend::Keyring),
            other => anyhow::bail!("Unknown token backend '{}' (expected file or keyring)", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub refresh_timeout_secs: Option<u64>,
}

impl Config {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Override fields from the environment. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(url) = var(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(email) = var(ENV_EMAIL) {
            self.last_email = Some(email);
        }
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn client_options(&self) -> ClientOptions {
        let mut options = ClientOptions::with_base_url(self.api_base_url());
        if let Some(secs) = self.request_timeout_secs.filter(|s| *s > 0) {
            options.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.refresh_timeout_secs.filter(|s| *s > 0) {
            options.refresh_timeout = Duration::from_secs(secs);
        }
        options
    }

    /// The configured token store. Keychain entries are keyed by API URL so
    /// sessions for different servers don't overwrite each other.
    pub fn token_store(&self, cache_dir: &Path) -> Arc<dyn TokenStore> {
        match self.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(cache_dir.to_path_buf())),
            TokenBackend::Keyring => Arc::new(KeyringTokenStore::new(self.api_base_url())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.api_base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.token_backend, TokenBackend::File);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_base_url: Some("https://blog.example.com/api/v1".into()),
            last_email: Some("ada@example.com".into()),
            token_backend: TokenBackend::Keyring,
            request_timeout_secs: Some(5),
            refresh_timeout_secs: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_base_url(), "https://blog.example.com/api/v1");
        assert_eq!(loaded.last_email.as_deref(), Some("ada@example.com"));
        assert_eq!(loaded.token_backend, TokenBackend::Keyring);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"keyring\""));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let env: HashMap<&str, &str> = [(ENV_API_URL, "http://staging:8080/api/v1"), (ENV_EMAIL, "  ")]
            .into_iter()
            .collect();
        let mut config = Config {
            last_email: Some("kept@example.com".into()),
            ..Default::default()
        };
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_base_url(), "http://staging:8080/api/v1");
        assert_eq!(config.last_email.as_deref(), Some("kept@example.com"));
    }

    #[test]
    fn test_client_options_use_timeouts() {
        let config = Config {
            request_timeout_secs: Some(7),
            refresh_timeout_secs: Some(0),
            ..Default::default()
        };
        let options = config.client_options();
        assert_eq!(options.request_timeout, Duration::from_secs(7));
        assert_eq!(options.refresh_timeout, ClientOptions::default().refresh_timeout);
    }

    #[test]
    fn test_token_backend_from_str() {
        assert_eq!("Keyring".parse::<TokenBackend>().unwrap(), TokenBackend::Keyring);
        assert_eq!("file".parse::<TokenBackend>().unwrap(), TokenBackend::File);
        assert!("vault".parse::<TokenBackend>().is_err());
    }
}
