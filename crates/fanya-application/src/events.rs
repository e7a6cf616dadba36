//! Store change notifications.

/// Published by the stores after every state mutation so a UI can re-render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The session list or a session's fields changed.
    SessionsChanged,
    ActiveSessionChanged { session_id: Option<String> },
    /// The rendered log of the bound session changed.
    MessagesChanged { session_id: Option<String> },
    /// A user-visible notice (validation rejects, failed storage calls).
    Alert { message: String },
}
