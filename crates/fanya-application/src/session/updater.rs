//! Session updater helper for metadata patches.
//!
//! Every metadata change (rename, archive, unarchive) goes through
//! [`SessionUpdater::update`], which stamps the patch with the current time so
//! `last_activity_at` is always bumped.

use chrono::Utc;
use fanya_core::error::Result;
use fanya_core::session::{Session, SessionPatch, SessionTable};
use std::sync::Arc;

pub struct SessionUpdater {
    table: Arc<dyn SessionTable>,
}

impl SessionUpdater {
    pub fn new(table: Arc<dyn SessionTable>) -> Self {
        Self { table }
    }

    pub async fn rename(&self, session_id: &str, name: &str) -> Result<Session> {
        self.update(session_id, SessionPatch::rename(name, Utc::now()))
            .await
    }

    /// Single path for both archive and unarchive.
    pub async fn set_archived(&self, session_id: &str, archived: bool) -> Result<Session> {
        self.update(session_id, SessionPatch::archived(archived, Utc::now()))
            .await
    }

    /// Sends `patch` to storage and returns the row as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The session doesn't exist
    /// - The remote call fails
    pub async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<Session> {
        tracing::debug!(
            "[SessionUpdater] update() called for session_id: {}, name={:?}, archived={:?}",
            session_id,
            patch.name,
            patch.archived
        );

        let session = self.table.update(session_id, patch).await?;

        tracing::debug!(
            "[SessionUpdater] Session updated: id={}, archived={}, last_activity_at={}",
            session.id,
            session.archived,
            session.last_activity_at
        );

        Ok(session)
    }
}
