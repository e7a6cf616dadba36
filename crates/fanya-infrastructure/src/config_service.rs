//! Configuration service implementation.
//!
//! Loads [`FanyaConfig`] from `~/.config/fanya/config.toml` and layers
//! environment overrides on top. A missing or empty file yields defaults.

use crate::paths::FanyaPaths;
use fanya_core::config::FanyaConfig;
use fanya_core::error::Result;
use std::path::{Path, PathBuf};

pub const ENV_AGENT_URL: &str = "FANYA_AGENT_URL";
pub const ENV_AGENT_TOKEN: &str = "FANYA_AGENT_TOKEN";
pub const ENV_LOG_LEVEL: &str = "FANYA_LOG_LEVEL";

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
}

impl ConfigService {
    /// Uses the default config file location.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(FanyaPaths::config_file()?))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file and applies `FANYA_*` environment overrides.
    pub fn load(&self) -> Result<FanyaConfig> {
        let mut config = self.load_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads the file only.
    pub fn load_file(&self) -> Result<FanyaConfig> {
        if !self.path.exists() {
            tracing::debug!(
                "[ConfigService] {} not found, using defaults",
                self.path.display()
            );
            return Ok(FanyaConfig::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(FanyaConfig::default());
        }

        let config = toml::from_str(&content)?;
        tracing::debug!("[ConfigService] Loaded {}", self.path.display());
        Ok(config)
    }

    pub fn save(&self, config: &FanyaConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.path, content)?;
        tracing::info!("[ConfigService] Saved {}", self.path.display());
        Ok(())
    }

    /// Writes a default config file unless one exists. Returns whether it wrote.
    pub fn write_template_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(&FanyaConfig::default())?;
        Ok(true)
    }
}

/// Overrides config values from the environment. Blank values are ignored.
pub fn apply_env_overrides<F>(config: &mut FanyaConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = read(ENV_AGENT_URL) {
        config.agent.url = Some(url);
    }
    if let Some(token) = read(ENV_AGENT_TOKEN) {
        config.agent.auth_token = Some(token);
    }
    if let Some(level) = read(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanya_core::config::DEFAULT_LOG_LEVEL;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_and_empty_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("config.toml"));
        assert_eq!(service.load_file().unwrap(), FanyaConfig::default());

        std::fs::write(service.path(), "  \n").unwrap();
        assert_eq!(service.load_file().unwrap(), FanyaConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("nested").join("config.toml"));

        let mut config = FanyaConfig::default();
        config.agent.url = Some("https://agent.example/webhook".to_string());
        config.engine.persist_user_messages = true;
        service.save(&config).unwrap();

        assert_eq!(service.load_file().unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("config.toml"));
        std::fs::write(service.path(), "[agent\nurl = ").unwrap();
        assert!(service.load_file().is_err());
    }

    #[test]
    fn test_template_written_once() {
        let dir = TempDir::new().unwrap();
        let service = ConfigService::with_path(dir.path().join("config.toml"));
        assert!(service.write_template_if_missing().unwrap());
        assert!(!service.write_template_if_missing().unwrap());
        assert!(service.path().exists());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_AGENT_URL, "http://localhost:5678/webhook"),
            (ENV_AGENT_TOKEN, "   "),
            (ENV_LOG_LEVEL, "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = FanyaConfig::default();
        config.agent.auth_token = Some("from-file".to_string());
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.agent.url.as_deref(), Some("http://localhost:5678/webhook"));
        assert_eq!(config.agent.auth_token.as_deref(), Some("from-file"));
        assert_eq!(config.logging.level, "debug");
        assert_ne!(config.logging.level, DEFAULT_LOG_LEVEL);
    }
}
