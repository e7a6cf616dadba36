//! Path management for fanya configuration and log files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/fanya/             # Config directory
//! ├── config.toml              # Application configuration
//! └── logs/                    # Application logs
//!     └── fanya.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Config directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find the user config directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for fanya_core::FanyaError {
    fn from(err: PathError) -> Self {
        fanya_core::FanyaError::config(err.to_string())
    }
}

pub struct FanyaPaths;

impl FanyaPaths {
    const APP_DIR: &'static str = "fanya";

    /// Returns the fanya configuration directory (e.g. `~/.config/fanya/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(Self::APP_DIR))
            .ok_or(PathError::ConfigDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the default logs directory (`<config_dir>/logs/`).
    pub fn logs_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("logs"))
    }
}
