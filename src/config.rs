use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::record::CredentialRecord;
use crate::resolver::ResolverSettings;
use crate::secrets::FileSecretStore;

/// Overrides the configuration directory (defaults to ~/.config/regcred)
pub const CONFIG_DIR_ENV: &str = "REGCRED_CONFIG_DIR";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub registries: Vec<CredentialRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_grant_attempts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_cli: Option<String>,

    /// File this config was loaded from
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Config {
    /// Get the configuration directory, creating it if needed
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".config")
                .join("regcred"),
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        }

        Ok(config_dir)
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_dir()?.join("config.json"))
    }

    /// Load configuration from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };

        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save configuration back to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => Self::config_dir()?.join("config.json"),
        };

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Secret store kept next to the config file
    pub fn secret_store(&self) -> Result<FileSecretStore> {
        let dir = match self.path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.to_path_buf(),
            None => Self::config_dir()?,
        };
        Ok(FileSecretStore::new(dir.join("secrets.json")))
    }

    /// Add a registry, replacing any existing entry for the same URL
    pub fn upsert_registry(&mut self, record: CredentialRecord) {
        self.registries.retain(|r| !r.matches_url(&record.url));
        self.registries.push(record);
    }

    /// Remove a registry, returning the removed record
    pub fn remove_registry(&mut self, url: &str) -> Option<CredentialRecord> {
        let index = self.registries.iter().position(|r| r.matches_url(url))?;
        Some(self.registries.remove(index))
    }

    pub fn find_registry(&self, url: &str) -> Option<&CredentialRecord> {
        self.registries.iter().find(|r| r.matches_url(url))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        let mut settings = ResolverSettings::default();
        if let Some(attempts) = self.password_grant_attempts {
            settings.password_grant_attempts = attempts;
        }
        settings
    }

    /// Container CLI used for `login` (with default fallback)
    pub fn get_container_cli(&self) -> String {
        self.container_cli
            .clone()
            .unwrap_or_else(|| "docker".to_string())
    }
}
