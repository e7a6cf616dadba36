//! Configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer; every section and
//! field has a default so a missing or partial file is valid.

use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_BUFFER: usize = 256;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FanyaConfig {
    pub agent: AgentConfig,
    pub engine: EngineConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

/// Where and how to reach the external agent.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Webhook URL; when unset the terminal client answers with the echo agent.
    pub url: Option<String>,
    /// Sent as a bearer token when present.
    pub auth_token: Option<String>,
    /// Request timeout in seconds. Unset means no timeout.
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the client inserts the user's `human` row itself instead of
    /// leaving it to the agent's conversation memory.
    pub persist_user_messages: bool,
    /// Capacity of the store notification channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_user_messages: false,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Offline identity used when no hosted auth is wired in.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IdentityConfig {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id: "local-user".to_string(),
            email: "local@fanya.invalid".to_string(),
            name: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `fanya_application=debug`.
    pub level: String,
    /// Overrides the default logs directory.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
        }
    }
}
