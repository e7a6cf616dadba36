//! In-memory session list synchronized with the `sessions` table.
//!
//! `SessionStore` owns the ordered session list, the active selection and the
//! loading/error flags. Mutations are applied optimistically and rolled back
//! when storage rejects them; push events from the user's sessions feed are
//! merged by id.

use super::updater::SessionUpdater;
use crate::events::StoreEvent;
use crate::realtime::{ChangeSink, RealtimeBridge};
use async_trait::async_trait;
use chrono::Utc;
use fanya_core::error::{FanyaError, Result};
use fanya_core::realtime::{ChangeEvent, Topic, TopicKind};
use fanya_core::reconcile::merge_in_place;
use fanya_core::session::{NewSession, Session, SessionTable};
use fanya_core::user::CurrentUser;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Point-in-time copy of the store for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<CurrentUser>,
    pub sessions: Vec<Session>,
    pub active_id: Option<String>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub include_archived: bool,
}

#[derive(Default)]
struct SessionState {
    user: Option<CurrentUser>,
    sessions: Vec<Session>,
    active_id: Option<String>,
    loading: bool,
    last_error: Option<String>,
    include_archived: bool,
    /// Bumped on identity changes and on every list request.
    generation: u64,
}

impl SessionState {
    fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.id.as_str())
    }

    fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == session_id)
    }

    /// Clears the active selection if it points at `session_id`.
    fn clear_active_if(&mut self, session_id: &str) -> bool {
        if self.active_id.as_deref() == Some(session_id) {
            self.active_id = None;
            true
        } else {
            false
        }
    }
}

struct SessionInner {
    state: RwLock<SessionState>,
    events: broadcast::Sender<StoreEvent>,
}

impl SessionInner {
    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn emit_active(&self, session_id: Option<String>) {
        self.emit(StoreEvent::ActiveSessionChanged { session_id });
    }
}

#[async_trait]
impl ChangeSink for SessionInner {
    async fn apply_change(&self, topic: &Topic, event: ChangeEvent) {
        let Topic::UserSessions { user_id } = topic else {
            return;
        };

        let active_cleared = {
            let mut state = self.state.write().await;
            if state.user_id() != Some(user_id.as_str()) {
                tracing::warn!(
                    "[SessionStore] Discarding session change for signed-out user {}",
                    user_id
                );
                return;
            }

            match event {
                ChangeEvent::SessionUpserted(session) => {
                    let id = session.id.clone();
                    let archived = session.archived;
                    if archived && !state.include_archived {
                        state.sessions.retain(|s| s.id != id);
                    } else {
                        merge_in_place(&mut state.sessions, session, |s| s.id.clone());
                    }
                    archived && state.clear_active_if(&id)
                }
                ChangeEvent::SessionDeleted { id, .. } => {
                    state.sessions.retain(|s| s.id != id);
                    state.clear_active_if(&id)
                }
                ChangeEvent::MessageInserted(_) => return,
            }
        };

        self.emit(StoreEvent::SessionsChanged);
        if active_cleared {
            self.emit_active(None);
        }
    }
}

pub struct SessionStore {
    inner: Arc<SessionInner>,
    table: Arc<dyn SessionTable>,
    updater: SessionUpdater,
    bridge: Arc<RealtimeBridge>,
}

impl SessionStore {
    pub fn new(
        table: Arc<dyn SessionTable>,
        bridge: Arc<RealtimeBridge>,
        events: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: RwLock::new(SessionState::default()),
                events,
            }),
            updater: SessionUpdater::new(table.clone()),
            table,
            bridge,
        }
    }

    // ============================================================================
    // Queries
    // ============================================================================

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            user: state.user.clone(),
            sessions: state.sessions.clone(),
            active_id: state.active_id.clone(),
            loading: state.loading,
            last_error: state.last_error.clone(),
            include_archived: state.include_archived,
        }
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.inner.state.read().await.user.clone()
    }

    pub async fn active_id(&self) -> Option<String> {
        self.inner.state.read().await.active_id.clone()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.state.read().await.sessions.clone()
    }

    /// Looks a session up locally, then in storage.
    pub async fn find(&self, session_id: &str) -> Result<Session> {
        {
            let state = self.inner.state.read().await;
            if let Some(index) = state.position(session_id) {
                return Ok(state.sessions[index].clone());
            }
        }
        self.table
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| FanyaError::not_found("Session", session_id))
    }

    // ============================================================================
    // Identity
    // ============================================================================

    /// Installs or clears the current user.
    ///
    /// A new user resets all state, subscribes to that user's sessions feed
    /// and lists their sessions. `None` tears everything down.
    pub async fn set_user(&self, user: Option<CurrentUser>) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            let same_user = state.user_id().is_some()
                && state.user_id() == user.as_ref().map(|next| next.id.as_str());
            if same_user {
                state.user = user;
                return Ok(());
            }

            let generation = state.generation + 1;
            *state = SessionState {
                user: user.clone(),
                generation,
                ..SessionState::default()
            };
        }
        self.inner.emit(StoreEvent::SessionsChanged);
        self.inner.emit_active(None);

        let Some(user) = user else {
            tracing::info!("[SessionStore] Signed out; session feed closed");
            self.bridge.unbind(TopicKind::Sessions).await;
            return Ok(());
        };

        tracing::info!("[SessionStore] Signed in as {}", user.id);
        let bound = self
            .bridge
            .bind(Topic::user_sessions(&user.id), self.inner.clone())
            .await;
        if let Err(e) = &bound {
            tracing::warn!("[SessionStore] Could not subscribe to session feed: {}", e);
        }
        let listed = self.list(false).await;
        bound?;
        listed.map(|_| ())
    }

    // ============================================================================
    // Listing and selection
    // ============================================================================

    /// Replaces the list with the user's sessions from storage.
    ///
    /// Failure clears the list and records the error. A result that arrives
    /// after a newer list request or an identity change is discarded.
    pub async fn list(&self, include_archived: bool) -> Result<Vec<Session>> {
        let (user_id, generation) = {
            let mut state = self.inner.state.write().await;
            let Some(user_id) = state.user_id().map(str::to_string) else {
                return Ok(Vec::new());
            };
            state.generation += 1;
            state.loading = true;
            state.include_archived = include_archived;
            (user_id, state.generation)
        };
        self.inner.emit(StoreEvent::SessionsChanged);

        let result = self.table.list_for_user(&user_id, include_archived).await;

        {
            let mut state = self.inner.state.write().await;
            if state.generation != generation {
                tracing::warn!(
                    "[SessionStore] Discarding stale session list (generation {} < {})",
                    generation,
                    state.generation
                );
                return result;
            }
            state.loading = false;
            match &result {
                Ok(sessions) => {
                    state.sessions = sessions.clone();
                    state.last_error = None;
                }
                Err(e) => {
                    tracing::error!("[SessionStore] Failed to list sessions: {}", e);
                    state.sessions.clear();
                    state.last_error = Some(e.user_message());
                }
            }
        }
        self.inner.emit(StoreEvent::SessionsChanged);
        result
    }

    /// Re-lists with the current archived filter.
    pub async fn refresh(&self) -> Result<Vec<Session>> {
        let include_archived = self.inner.state.read().await.include_archived;
        self.list(include_archived).await
    }

    /// Sets the active session and moves it to the front of the list.
    ///
    /// The rest of the list keeps its order; nothing is written to storage.
    pub async fn set_active(&self, session_id: Option<&str>) {
        {
            let mut state = self.inner.state.write().await;
            state.active_id = session_id.map(str::to_string);
            if let Some(id) = session_id
                && let Some(index) = state.position(id)
                && index > 0
            {
                let session = state.sessions.remove(index);
                state.sessions.insert(0, session);
            }
        }
        self.inner.emit_active(session_id.map(str::to_string));
        self.inner.emit(StoreEvent::SessionsChanged);
    }

    // ============================================================================
    // Mutations
    // ============================================================================

    /// Creates a session, makes it active and refreshes the list.
    pub async fn create(&self, name: Option<&str>) -> Result<Session> {
        let user_id = self
            .inner
            .state
            .read()
            .await
            .user_id()
            .map(str::to_string)
            .ok_or_else(|| FanyaError::validation("Sign in before starting a session."))?;

        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let session = match self
            .table
            .insert(NewSession::new(user_id, name, Utc::now()))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.fail("create session", &e).await;
                return Err(e);
            }
        };
        tracing::info!("[SessionStore] Created session {}", session.id);

        self.upsert_front(session.clone()).await;
        self.set_active(Some(&session.id)).await;

        if let Err(e) = self.refresh().await {
            tracing::warn!("[SessionStore] Refresh after create failed: {}", e);
            self.upsert_front(session.clone()).await;
            self.inner.emit(StoreEvent::SessionsChanged);
        }
        Ok(session)
    }

    /// Renames a session. Blank or unchanged names are a silent no-op.
    pub async fn rename(&self, session_id: &str, new_name: &str) -> Result<Session> {
        let trimmed = new_name.trim();
        let current = self.find(session_id).await?;
        if trimmed.is_empty() || current.name.as_deref() == Some(trimmed) {
            return Ok(current);
        }

        let previous = {
            let mut state = self.inner.state.write().await;
            state.position(session_id).map(|index| {
                let slot = &mut state.sessions[index];
                let previous = slot.clone();
                slot.name = Some(trimmed.to_string());
                previous
            })
        };
        self.inner.emit(StoreEvent::SessionsChanged);

        match self.updater.rename(session_id, trimmed).await {
            Ok(updated) => {
                self.replace_if_listed(updated.clone()).await;
                self.inner.emit(StoreEvent::SessionsChanged);
                Ok(updated)
            }
            Err(e) => {
                if let Some(previous) = previous {
                    self.replace_if_listed(previous).await;
                }
                self.fail("rename session", &e).await;
                Err(e)
            }
        }
    }

    pub async fn archive(&self, session_id: &str) -> Result<Session> {
        self.update_flag(session_id, true).await
    }

    pub async fn unarchive(&self, session_id: &str) -> Result<Session> {
        self.update_flag(session_id, false).await
    }

    async fn update_flag(&self, session_id: &str, archived: bool) -> Result<Session> {
        let (previous, was_active) = {
            let mut state = self.inner.state.write().await;
            let previous = state
                .position(session_id)
                .map(|index| (index, state.sessions[index].clone()));

            if archived && !state.include_archived {
                state.sessions.retain(|s| s.id != session_id);
            } else if let Some(index) = state.position(session_id) {
                state.sessions[index].archived = archived;
            }
            let was_active = archived && state.clear_active_if(session_id);
            (previous, was_active)
        };
        self.inner.emit(StoreEvent::SessionsChanged);
        if was_active {
            self.inner.emit_active(None);
        }

        match self.updater.set_archived(session_id, archived).await {
            Ok(updated) => {
                let visible = {
                    let state = self.inner.state.read().await;
                    !updated.archived || state.include_archived
                };
                if visible {
                    self.upsert_front(updated.clone()).await;
                }
                self.inner.emit(StoreEvent::SessionsChanged);
                Ok(updated)
            }
            Err(e) => {
                {
                    let mut state = self.inner.state.write().await;
                    if let Some((index, session)) = previous {
                        match state.position(session_id) {
                            Some(current) => state.sessions[current] = session,
                            None => {
                                let index = index.min(state.sessions.len());
                                state.sessions.insert(index, session);
                            }
                        }
                    }
                    if was_active && state.active_id.is_none() {
                        state.active_id = Some(session_id.to_string());
                    }
                }
                if was_active {
                    self.inner.emit_active(Some(session_id.to_string()));
                }
                let action = if archived {
                    "archive session"
                } else {
                    "unarchive session"
                };
                self.fail(action, &e).await;
                Err(e)
            }
        }
    }

    // ============================================================================
    // Helpers
    // ============================================================================

    /// Replaces the row in place, or inserts it at the front.
    async fn upsert_front(&self, session: Session) {
        let mut state = self.inner.state.write().await;
        match state.position(&session.id) {
            Some(index) => state.sessions[index] = session,
            None => state.sessions.insert(0, session),
        }
    }

    async fn replace_if_listed(&self, session: Session) {
        let mut state = self.inner.state.write().await;
        if let Some(index) = state.position(&session.id) {
            state.sessions[index] = session;
        }
    }

    /// Records a failed mutation and raises an alert.
    async fn fail(&self, action: &str, error: &FanyaError) {
        tracing::error!("[SessionStore] Failed to {}: {}", action, error);
        self.inner.state.write().await.last_error = Some(error.user_message());
        self.inner.emit(StoreEvent::SessionsChanged);
        self.inner.emit(StoreEvent::Alert {
            message: format!("Could not {}: {}", action, error.user_message()),
        });
    }
}
