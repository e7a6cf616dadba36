//! Push-subscription port.
//!
//! The hosted backend offers a row-level change feed. The engine consumes two
//! topics: inserts on `chat_messages` for one session, and every change on
//! `sessions` for one user.

use crate::error::Result;
use crate::message::RawStoredRecord;
use crate::session::Session;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// The channel a subscription listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inserts on `chat_messages` where `session_id` matches.
    SessionMessages { session_id: String },
    /// All changes on `sessions` where `user_id` matches.
    UserSessions { user_id: String },
}

/// Topic family; at most one subscription per family is open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Messages,
    Sessions,
}

impl Topic {
    pub fn session_messages(session_id: impl Into<String>) -> Self {
        Self::SessionMessages {
            session_id: session_id.into(),
        }
    }

    pub fn user_sessions(user_id: impl Into<String>) -> Self {
        Self::UserSessions {
            user_id: user_id.into(),
        }
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            Self::SessionMessages { .. } => TopicKind::Messages,
            Self::UserSessions { .. } => TopicKind::Sessions,
        }
    }

    /// Whether `event` belongs on this topic.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match (self, event) {
            (Self::SessionMessages { session_id }, ChangeEvent::MessageInserted(record)) => {
                &record.session_id == session_id
            }
            (Self::UserSessions { user_id }, ChangeEvent::SessionUpserted(session)) => {
                &session.user_id == user_id
            }
            (
                Self::UserSessions { user_id },
                ChangeEvent::SessionDeleted { user_id: owner, .. },
            ) => owner == user_id,
            _ => false,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionMessages { session_id } => {
                write!(f, "chat_messages:session_id=eq.{}", session_id)
            }
            Self::UserSessions { user_id } => write!(f, "sessions:user_id=eq.{}", user_id),
        }
    }
}

/// One row change delivered by the push feed.
///
/// Delivery is at-least-once and unordered relative to concurrent fetches.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    MessageInserted(RawStoredRecord),
    /// A `sessions` row was inserted or updated.
    SessionUpserted(Session),
    SessionDeleted { id: String, user_id: String },
}

/// Identifier of one open subscription on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// An open subscription: its id, its topic and the receiving end of its feed.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic: Topic,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Backend side of the push feed.
#[async_trait]
pub trait RealtimeBackend: Send + Sync {
    /// Opens a subscription filtered to `topic`.
    async fn subscribe(&self, topic: Topic) -> Result<Subscription>;

    /// Closes a subscription. After this returns no further events are sent
    /// on its channel. Closing an unknown id is not an error.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}
