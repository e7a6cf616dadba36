//! Session domain model.
//!
//! Mirrors one row of the remote `sessions` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, timestamped conversation thread owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-assigned session identifier
    pub id: String,
    /// Owner of the session
    pub user_id: String,
    /// User-editable name; `None` falls back to the creation timestamp for display
    pub name: Option<String>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Last time the session was written to; drives listing order
    pub last_activity_at: DateTime<Utc>,
    /// Archived sessions are hidden from the default listing
    #[serde(default)]
    pub archived: bool,
}

impl Session {
    /// Name shown in session lists.
    ///
    /// A non-blank `name` wins; otherwise the creation time is formatted,
    /// e.g. `Session from 19 Oct, 14:05`.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Session from {}", self.created_at.format("%d %b, %H:%M")),
        }
    }
}

/// Row shape inserted into the `sessions` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl NewSession {
    /// A fresh session stamped with `now` for both timestamps.
    pub fn new(user_id: impl Into<String>, name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            name,
            created_at: now,
            last_activity_at: now,
        }
    }
}

/// Partial update applied to one `sessions` row.
///
/// Every patch bumps `last_activity_at`; the other fields are only written
/// when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionPatch {
    pub fn rename(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: Some(name.into()),
            archived: None,
            last_activity_at: now,
        }
    }

    pub fn archived(archived: bool, now: DateTime<Utc>) -> Self {
        Self {
            name: None,
            archived: Some(archived),
            last_activity_at: now,
        }
    }

    /// Applies this patch to a local copy of the row.
    pub fn apply_to(&self, session: &mut Session) {
        if let Some(name) = &self.name {
            session.name = Some(name.clone());
        }
        if let Some(archived) = self.archived {
            session.archived = archived;
        }
        session.last_activity_at = self.last_activity_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(name: Option<&str>) -> Session {
        let created = Utc.with_ymd_and_hms(2025, 10, 19, 14, 5, 0).unwrap();
        Session {
            id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            name: name.map(str::to_string),
            created_at: created,
            last_activity_at: created,
            archived: false,
        }
    }

    #[test]
    fn test_display_name_prefers_name() {
        assert_eq!(session(Some("Groceries")).display_name(), "Groceries");
    }

    #[test]
    fn test_display_name_falls_back_to_created_at() {
        assert_eq!(session(None).display_name(), "Session from 19 Oct, 14:05");
        assert_eq!(session(Some("   ")).display_name(), "Session from 19 Oct, 14:05");
    }

    #[test]
    fn test_patch_bumps_activity_and_keeps_name() {
        let mut s = session(Some("Keep"));
        let later = s.created_at + chrono::Duration::minutes(3);
        SessionPatch::archived(true, later).apply_to(&mut s);

        assert!(s.archived);
        assert_eq!(s.name.as_deref(), Some("Keep"));
        assert_eq!(s.last_activity_at, later);
    }
}
