//! Configuration loading and persistence.
//!
//! Handles reading and writing the relay configuration file. Secrets (the
//! push server key and the identity-provider key) are never serialized to
//! disk; they come from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::Path, path::PathBuf};

use crate::constants::DEFAULT_FCM_API_URL;

/// Configuration for the callrelay service.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Endpoint of the push service's send API.
    pub fcm_api_url: String,
    /// Push server key - NOT serialized to disk (env only).
    #[serde(skip)]
    pub fcm_server_key: String,
    /// Base URL of the legacy credential store.
    pub directory_url: String,
    /// Base URL of the identity provider issuing session tokens.
    pub identity_url: String,
    /// Identity-provider API key - NOT serialized to disk (env only).
    #[serde(skip)]
    pub identity_api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            fcm_api_url: DEFAULT_FCM_API_URL.to_string(),
            fcm_server_key: String::new(),
            directory_url: String::new(),
            identity_url: String::new(),
            identity_api_key: String::new(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `CALLRELAY_CONFIG_DIR` overrides the platform config dir; tests
    /// point it at a temp directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("CALLRELAY_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("callrelay")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from_path(&config_path).unwrap_or_default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind_addr) = std::env::var("CALLRELAY_BIND") {
            self.bind_addr = bind_addr;
        }
        if let Ok(api_url) = std::env::var("CALLRELAY_FCM_API_URL") {
            self.fcm_api_url = api_url;
        }
        if let Ok(key) = std::env::var("CALLRELAY_FCM_SERVER_KEY") {
            self.fcm_server_key = key;
        }
        if let Ok(url) = std::env::var("CALLRELAY_DIRECTORY_URL") {
            self.directory_url = url;
        }
        if let Ok(url) = std::env::var("CALLRELAY_IDENTITY_URL") {
            self.identity_url = url;
        }
        if let Ok(key) = std::env::var("CALLRELAY_IDENTITY_API_KEY") {
            self.identity_api_key = key;
        }
    }

    /// Checks that everything the serve loop needs is present.
    pub fn validate_for_serve(&self) -> Result<()> {
        if self.fcm_server_key.is_empty() {
            anyhow::bail!("CALLRELAY_FCM_SERVER_KEY is required to serve");
        }
        if self.directory_url.is_empty() {
            anyhow::bail!("directory_url is required to serve (login path)");
        }
        if self.identity_url.is_empty() {
            anyhow::bail!("identity_url is required to serve (login path)");
        }
        Ok(())
    }

    /// Persists the current configuration to disk.
    /// Note: secrets are skipped by serde and never written.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.fcm_api_url, DEFAULT_FCM_API_URL);
        assert!(config.fcm_server_key.is_empty());
    }

    #[test]
    fn test_serialization_excludes_secrets() {
        let mut config = Config::default();
        config.fcm_server_key = "push-secret".to_string();
        config.identity_api_key = "idp-secret".to_string();
        let json = serde_json::to_string(&config).expect("serialize");

        assert!(!json.contains("push-secret"));
        assert!(!json.contains("idp-secret"));
        assert!(json.contains("bind_addr"));
    }

    #[test]
    fn test_load_from_path_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.directory_url = "https://store.example.com".to_string();
        fs::write(&path, serde_json::to_string_pretty(&config).expect("serialize"))
            .expect("write");

        let loaded = Config::load_from_path(&path).expect("load");
        assert_eq!(loaded.directory_url, "https://store.example.com");
        assert_eq!(loaded.bind_addr, config.bind_addr);
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        // No other test touches these variables, so this is safe to run in
        // parallel with the rest of the suite.
        std::env::set_var("CALLRELAY_BIND", "127.0.0.1:9999");
        std::env::set_var("CALLRELAY_FCM_SERVER_KEY", "env-push-key");
        std::env::set_var("CALLRELAY_DIRECTORY_URL", "https://env.example.com");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("CALLRELAY_BIND");
        std::env::remove_var("CALLRELAY_FCM_SERVER_KEY");
        std::env::remove_var("CALLRELAY_DIRECTORY_URL");

        assert_eq!(config.bind_addr, "127.0.0.1:9999");
        assert_eq!(config.fcm_server_key, "env-push-key");
        assert_eq!(config.directory_url, "https://env.example.com");
        // Untouched fields keep their file/default values.
        assert_eq!(config.fcm_api_url, DEFAULT_FCM_API_URL);
    }

    #[test]
    fn test_validate_for_serve_requires_secrets() {
        let mut config = Config::default();
        assert!(config.validate_for_serve().is_err());

        config.fcm_server_key = "key".to_string();
        config.directory_url = "https://store.example.com".to_string();
        config.identity_url = "https://idp.example.com".to_string();
        assert!(config.validate_for_serve().is_ok());
    }
}
