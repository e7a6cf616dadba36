//! Message domain module.
//!
//! # Module Structure
//!
//! - `model`: Normalized messages, log entries and wire records
//! - `payload`: Total parser from stored/agent JSON to normalized messages
//! - `repository`: Port for the remote `chat_messages` table

mod model;
pub mod payload;
mod repository;

pub use model::{
    ContextMessage, EntryState, LOCAL_ID_PREFIX, LogEntry, Message, MessageId, NewMessageRecord,
    RawStoredRecord, SenderRole,
};
pub use payload::{StoredPayload, parse_agent_reply, parse_record};
pub use repository::MessageTable;
