//! Session table port.
//!
//! Defines the interface for the remote `sessions` table.

use super::model::{NewSession, Session, SessionPatch};
use crate::error::Result;
use async_trait::async_trait;

/// Authenticated CRUD access to the `sessions` table.
///
/// This trait decouples the stores from the hosted backend. Implementations
/// report any remote failure as [`FanyaError::Transport`](crate::FanyaError::Transport).
#[async_trait]
pub trait SessionTable: Send + Sync {
    /// Lists the user's sessions ordered by `last_activity_at` descending.
    ///
    /// When `include_archived` is false, archived rows are filtered out by
    /// the storage side.
    async fn list_for_user(&self, user_id: &str, include_archived: bool) -> Result<Vec<Session>>;

    /// Finds one session by id regardless of its archived flag.
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Inserts a new row and returns it as stored.
    async fn insert(&self, session: NewSession) -> Result<Session>;

    /// Applies a partial update and returns the updated row.
    ///
    /// # Returns
    ///
    /// - `Ok(Session)`: the row after the update
    /// - `Err(FanyaError::NotFound)`: no row with that id
    /// - `Err(FanyaError::Transport)`: the remote call failed
    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<Session>;
}
