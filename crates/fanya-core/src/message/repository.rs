//! Message table port.

use super::model::{NewMessageRecord, RawStoredRecord};
use crate::error::Result;
use async_trait::async_trait;

/// Authenticated access to the `chat_messages` table.
#[async_trait]
pub trait MessageTable: Send + Sync {
    /// Returns every raw record of a session ordered by ascending id.
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<RawStoredRecord>>;

    /// Inserts a record and returns it with its server-assigned id.
    async fn insert(&self, record: NewMessageRecord) -> Result<RawStoredRecord>;
}
