//! Error types for the Fanya engine.

use thiserror::Error;

/// A shared error type for the entire Fanya workspace.
///
/// The first three variants carry the engine's failure taxonomy:
/// transport failures are recovered by rolling back optimistic state,
/// parse failures are rendered as visible fallback messages, and validation
/// failures are rejected before any network effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FanyaError {
    /// A storage, realtime or agent call failed.
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: String, message: String },

    /// A stored or received payload could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input rejected before any network effect (empty text, missing identity).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FanyaError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Transport error for the named operation
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a Transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Message suitable for showing to the user in an alert or a system message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { message, .. } => message.clone(),
            Self::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for FanyaError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for FanyaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FanyaError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for FanyaError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error, used by adapters built on anyhow contexts
impl From<anyhow::Error> for FanyaError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, FanyaError>`.
pub type Result<T> = std::result::Result<T, FanyaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_user_message_is_bare_message() {
        let err = FanyaError::transport("agent call", "connection refused");
        assert!(err.is_transport());
        assert_eq!(err.user_message(), "connection refused");
        assert_eq!(
            err.to_string(),
            "Transport error during agent call: connection refused"
        );
    }

    #[test]
    fn test_json_error_converts_to_serialization() {
        let err: FanyaError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, FanyaError::Serialization { ref format, .. } if format == "JSON"));
    }
}
