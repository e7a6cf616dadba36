//! Facade that wires the stores to their ports.
//!
//! `ChatEngine` is what a UI talks to. It owns one [`SessionStore`], one
//! [`MessageStore`] and the [`RealtimeBridge`] they share, and keeps the
//! message log bound to whichever session is active.

use crate::events::StoreEvent;
use crate::message::{MessageStore, SendOutcome};
use crate::realtime::RealtimeBridge;
use crate::session::SessionStore;
use fanya_core::agent::AgentEndpoint;
use fanya_core::config::EngineConfig;
use fanya_core::error::Result;
use fanya_core::message::{MessageId, MessageTable};
use fanya_core::realtime::RealtimeBackend;
use fanya_core::session::{Session, SessionTable};
use fanya_core::user::CurrentUser;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The four external collaborators of the engine.
#[derive(Clone)]
pub struct EnginePorts {
    pub sessions: Arc<dyn SessionTable>,
    pub messages: Arc<dyn MessageTable>,
    pub realtime: Arc<dyn RealtimeBackend>,
    pub agent: Arc<dyn AgentEndpoint>,
}

pub struct ChatEngine {
    sessions: Arc<SessionStore>,
    messages: MessageStore,
    bridge: Arc<RealtimeBridge>,
    events: broadcast::Sender<StoreEvent>,
}

impl ChatEngine {
    pub fn new(ports: EnginePorts, config: &EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let bridge = Arc::new(RealtimeBridge::new(ports.realtime));
        let sessions = Arc::new(SessionStore::new(
            ports.sessions,
            bridge.clone(),
            events.clone(),
        ));
        let messages = MessageStore::new(
            ports.messages,
            sessions.clone(),
            bridge.clone(),
            ports.agent,
            events.clone(),
        )
        .with_persisted_user_messages(config.persist_user_messages);

        Self {
            sessions,
            messages,
            bridge,
            events,
        }
    }

    /// Receives every [`StoreEvent`] published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Installs or clears the signed-in user.
    ///
    /// Switching to a different user (or to none) unbinds the message log and
    /// reloads the session list. Re-supplying the same user only refreshes
    /// its profile.
    pub async fn set_identity(&self, user: Option<CurrentUser>) -> Result<()> {
        let previous = self.sessions.current_user().await.map(|u| u.id);
        let changed = previous.as_deref() != user.as_ref().map(|u| u.id.as_str());

        if changed {
            self.messages.bind(None).await?;
        }
        self.sessions.set_user(user).await
    }

    pub async fn list_sessions(&self, include_archived: bool) -> Result<Vec<Session>> {
        self.sessions.list(include_archived).await
    }

    /// Makes `session_id` active and binds the message log to it.
    ///
    /// Archived sessions can be selected by id even though they are not listed.
    pub async fn select_session(&self, session_id: Option<&str>) -> Result<()> {
        if let Some(id) = session_id {
            self.sessions.find(id).await?;
        }
        self.sessions.set_active(session_id).await;
        self.messages.bind(session_id).await
    }

    pub async fn create_session(&self, name: Option<&str>) -> Result<Session> {
        let session = self.sessions.create(name).await?;
        if let Err(e) = self.messages.bind(Some(&session.id)).await {
            tracing::warn!(
                "[ChatEngine] Created session {} but could not load it: {}",
                session.id,
                e
            );
        }
        Ok(session)
    }

    pub async fn rename_session(&self, session_id: &str, name: &str) -> Result<Session> {
        self.sessions.rename(session_id, name).await
    }

    pub async fn archive_session(&self, session_id: &str) -> Result<Session> {
        let result = self.sessions.archive(session_id).await;
        self.sync_binding().await?;
        result
    }

    pub async fn unarchive_session(&self, session_id: &str) -> Result<Session> {
        let result = self.sessions.unarchive(session_id).await;
        self.sync_binding().await?;
        result
    }

    pub async fn send(&self, text: &str) -> Result<SendOutcome> {
        self.messages.send_user_message(text).await
    }

    pub async fn pin_for_context(&self, id: &MessageId) -> Result<()> {
        self.messages.pin_for_context(id).await
    }

    pub async fn unpin(&self, id: &MessageId) -> bool {
        self.messages.unpin(id).await
    }

    /// Rebinds the message log when the active session changed underneath it,
    /// e.g. after a pushed archive cleared the selection.
    pub async fn sync_binding(&self) -> Result<()> {
        let active = self.sessions.active_id().await;
        if self.messages.bound_session().await != active {
            tracing::debug!("[ChatEngine] Rebinding message log to {:?}", active);
            self.messages.bind(active.as_deref()).await?;
        }
        Ok(())
    }

    /// Closes every open subscription.
    pub async fn shutdown(&self) {
        self.bridge.unbind_all().await;
        tracing::info!("[ChatEngine] Shut down");
    }
}
