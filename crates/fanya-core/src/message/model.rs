//! Conversation message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix marking an id that was generated locally and never confirmed by storage.
pub const LOCAL_ID_PREFIX: &str = "temp-";

/// Identity of a message in the rendered log.
///
/// Confirmed messages carry the durable id assigned by storage; optimistic
/// and local-only messages carry a generated `temp-` id that never appears
/// server-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Local(String),
}

impl MessageId {
    /// Generates a fresh local id.
    pub fn new_local() -> Self {
        Self::Local(format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    pub fn server_id(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{}", id),
            Self::Local(id) => f.write_str(id),
        }
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self::Server(id)
    }
}

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    /// Message typed by the user.
    User,
    /// Message produced by the external agent.
    Agent,
    /// Diagnostics and error notices generated by the engine.
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized message ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: String,
    pub sender_role: SenderRole,
    pub content: String,
}

impl Message {
    /// A message that only exists on this client (error notices, direct agent replies).
    pub fn local(
        session_id: impl Into<String>,
        sender_role: SenderRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new_local(),
            session_id: session_id.into(),
            sender_role,
            content: content.into(),
        }
    }
}

/// Lifecycle of one rendered log entry.
///
/// `Pending` entries either become `Confirmed` when storage echoes them back
/// or are removed when the send fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Backed by a durable storage row.
    Confirmed,
    /// Optimistically rendered, waiting for storage to echo it back.
    Pending,
    /// Rendered locally only; storage will never confirm it.
    LocalOnly,
}

/// A message plus its optimistic lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: Message,
    pub state: EntryState,
}

impl LogEntry {
    pub fn confirmed(message: Message) -> Self {
        Self {
            message,
            state: EntryState::Confirmed,
        }
    }

    pub fn pending(message: Message) -> Self {
        Self {
            message,
            state: EntryState::Pending,
        }
    }

    pub fn local_only(message: Message) -> Self {
        Self {
            message,
            state: EntryState::LocalOnly,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.message.id
    }

    pub fn is_pending(&self) -> bool {
        self.state == EntryState::Pending
    }
}

/// One row of the `chat_messages` table before normalization.
///
/// `message` is either a JSON-encoded string or an already-decoded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStoredRecord {
    pub id: i64,
    pub session_id: String,
    pub message: Value,
}

/// Row shape inserted into the `chat_messages` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessageRecord {
    pub session_id: String,
    pub message: Value,
}

/// A pinned message forwarded to the agent as extra conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: SenderRole,
    pub content: String,
}

impl From<&Message> for ContextMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.sender_role,
            content: message.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ids_are_prefixed_and_unique() {
        let a = MessageId::new_local();
        let b = MessageId::new_local();
        assert!(a.to_string().starts_with(LOCAL_ID_PREFIX));
        assert!(!a.is_server());
        assert_ne!(a, b);
    }

    #[test]
    fn test_message_id_deserializes_untagged() {
        let server: MessageId = serde_json::from_str("42").unwrap();
        let local: MessageId = serde_json::from_str("\"temp-abc\"").unwrap();
        assert_eq!(server, MessageId::Server(42));
        assert_eq!(local, MessageId::Local("temp-abc".to_string()));
    }

    #[test]
    fn test_context_message_serializes_lowercase_role() {
        let ctx = ContextMessage {
            role: SenderRole::Agent,
            content: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&ctx).unwrap(),
            serde_json::json!({"role": "agent", "content": "hi"})
        );
    }
}
