//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend and auth service endpoints, the auth service's public key, and
//! the last email used to sign in. Environment variables take precedence
//! over the file.
//!
//! Configuration is stored at `~/.config/tradedash/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tradedash";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const ENV_API_URL: &str = "TRADEDASH_API_URL";
pub const ENV_AUTH_URL: &str = "TRADEDASH_AUTH_URL";
pub const ENV_AUTH_ANON_KEY: &str = "TRADEDASH_AUTH_ANON_KEY";

fn default_encrypt_session() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub auth_anon_key: Option<String>,
    #[serde(default)]
    pub last_email: Option<String>,
    /// Encrypt the persisted session with a key kept in the OS keychain
    #[serde(default = "default_encrypt_session")]
    pub encrypt_session: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            auth_url: None,
            auth_anon_key: None,
            last_email: None,
            encrypt_session: default_encrypt_session(),
        }
    }
}

/// First non-blank value wins
fn pick(env: Option<String>, file: Option<&str>) -> Option<String> {
    env.filter(|v| !v.trim().is_empty())
        .or_else(|| file.filter(|v| !v.trim().is_empty()).map(str::to_string))
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Ok(Self::default())
        }
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

    /// Directory holding the persisted session
    pub fn data_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend base URL: environment, then config file, then the local default
    pub fn api_url(&self) -> String {
        pick(std::env::var(ENV_API_URL).ok(), self.api_url.as_deref())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn auth_url(&self) -> Option<String> {
        pick(std::env::var(ENV_AUTH_URL).ok(), self.auth_url.as_deref())
    }

    pub fn auth_anon_key(&self) -> Option<String> {
        pick(std::env::var(ENV_AUTH_ANON_KEY).ok(), self.auth_anon_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_precedence() {
        assert_eq!(pick(Some("env".into()), Some("file")), Some("env".to_string()));
        assert_eq!(pick(None, Some("file")), Some("file".to_string()));
        assert_eq!(pick(Some("  ".into()), Some("file")), Some("file".to_string()));
        assert_eq!(pick(None, Some("")), None);
        assert_eq!(pick(None, None), None);
    }

    #[test]
    fn test_data_dir_is_under_cache_dir() {
        let Some(cache) = dirs::cache_dir() else {
            return;
        };
        let dir = Config::default().data_dir().expect("data dir");
        assert_eq!(dir, cache.join(APP_NAME));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{"last_email": "a@b.c"}"#)
            .expect("Failed to parse config");
        assert!(config.encrypt_session);
        assert_eq!(config.last_email.as_deref(), Some("a@b.c"));
        assert!(config.api_url.is_none());
    }

    #[test]
    fn test_api_url_falls_back_to_file_then_default() {
        // Only meaningful when the environment doesn't override it
        if std::env::var(ENV_API_URL).is_ok() {
            return;
        }
        let mut config = Config::default();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        config.api_url = Some("https://api.example.com".into());
        assert_eq!(config.api_url(), "https://api.example.com");
    }
}
