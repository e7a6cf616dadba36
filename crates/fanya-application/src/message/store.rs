//! Message log of the active session and the send pipeline.

use super::log::MessageLog;
use crate::events::StoreEvent;
use crate::realtime::{ChangeSink, RealtimeBridge};
use crate::session::SessionStore;
use async_trait::async_trait;
use fanya_core::agent::{AgentEndpoint, AgentRequest};
use fanya_core::error::{FanyaError, Result};
use fanya_core::message::{
    ContextMessage, LogEntry, Message, MessageId, MessageTable, NewMessageRecord, SenderRole,
    StoredPayload, parse_agent_reply, parse_record,
};
use fanya_core::realtime::{ChangeEvent, Topic, TopicKind};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};

/// Point-in-time copy of the bound log for rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSnapshot {
    pub session_id: Option<String>,
    pub entries: Vec<LogEntry>,
    pub pinned: Vec<MessageId>,
}

/// How a send attempt ended. Exactly one of these is produced per send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The agent answered; its reply was appended to the log.
    Replied(Message),
    /// The send failed; the optimistic entry was replaced by a system notice.
    Failed(FanyaError),
    /// The user switched sessions before the result arrived.
    Discarded,
}

struct MessageInner {
    table: Arc<dyn MessageTable>,
    log: RwLock<MessageLog>,
    events: broadcast::Sender<StoreEvent>,
}

impl MessageInner {
    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn emit_changed(&self, session_id: &str) {
        self.emit(StoreEvent::MessagesChanged {
            session_id: Some(session_id.to_string()),
        });
    }
}

#[async_trait]
impl ChangeSink for MessageInner {
    async fn apply_change(&self, _topic: &Topic, event: ChangeEvent) {
        let ChangeEvent::MessageInserted(record) = event else {
            return;
        };

        let changed = {
            let mut log = self.log.write().await;
            if log.session_id() != Some(record.session_id.as_str()) {
                tracing::warn!(
                    "[MessageStore] Discarding insert {} for unbound session {}",
                    record.id,
                    record.session_id
                );
                return;
            }
            log.apply_remote(parse_record(&record))
        };

        if changed {
            tracing::debug!("[MessageStore] Applied pushed message {}", record.id);
            self.emit_changed(&record.session_id);
        }
    }
}

pub struct MessageStore {
    inner: Arc<MessageInner>,
    sessions: Arc<SessionStore>,
    bridge: Arc<RealtimeBridge>,
    agent: Arc<dyn AgentEndpoint>,
    persist_user_messages: bool,
    bind_lock: Mutex<()>,
}

impl MessageStore {
    pub fn new(
        table: Arc<dyn MessageTable>,
        sessions: Arc<SessionStore>,
        bridge: Arc<RealtimeBridge>,
        agent: Arc<dyn AgentEndpoint>,
        events: broadcast::Sender<StoreEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                table,
                log: RwLock::new(MessageLog::default()),
                events,
            }),
            sessions,
            bridge,
            agent,
            persist_user_messages: false,
            bind_lock: Mutex::new(()),
        }
    }

    /// Writes the human row to storage before calling the agent.
    pub fn with_persisted_user_messages(mut self, persist: bool) -> Self {
        self.persist_user_messages = persist;
        self
    }

    pub async fn snapshot(&self) -> MessageSnapshot {
        let log = self.inner.log.read().await;
        MessageSnapshot {
            session_id: log.session_id().map(str::to_string),
            entries: log.entries(),
            pinned: log.pinned().to_vec(),
        }
    }

    pub async fn bound_session(&self) -> Option<String> {
        self.inner.log.read().await.session_id().map(str::to_string)
    }

    /// Pinned messages that will accompany the next send.
    pub async fn context(&self) -> Vec<ContextMessage> {
        self.inner.log.read().await.context()
    }

    // ============================================================================
    // Binding
    // ============================================================================

    /// Switches the log to `session_id`.
    ///
    /// The previous message subscription is closed and the log cleared
    /// before history is fetched and a new subscription opened. `None`
    /// leaves the store unbound.
    pub async fn bind(&self, session_id: Option<&str>) -> Result<()> {
        let _guard = self.bind_lock.lock().await;

        self.bridge.unbind(TopicKind::Messages).await;
        let generation = self
            .inner
            .log
            .write()
            .await
            .reset(session_id.map(str::to_string));
        self.inner.emit(StoreEvent::MessagesChanged {
            session_id: session_id.map(str::to_string),
        });

        let Some(session_id) = session_id else {
            tracing::debug!("[MessageStore] Unbound");
            return Ok(());
        };
        tracing::info!("[MessageStore] Binding session {}", session_id);

        if let Err(e) = self.load(session_id, generation).await {
            self.inner.emit(StoreEvent::Alert {
                message: format!("Could not load messages: {}", e.user_message()),
            });
            return Err(e);
        }

        self.bridge
            .bind(Topic::session_messages(session_id), self.inner.clone())
            .await
    }

    /// Re-fetches the bound session's history and replaces the log with it.
    ///
    /// Pending and local-only entries are dropped.
    pub async fn fetch_all(&self) -> Result<Vec<Message>> {
        let _guard = self.bind_lock.lock().await;
        let (session_id, generation) = {
            let log = self.inner.log.read().await;
            match log.session_id() {
                Some(session_id) => (session_id.to_string(), log.generation()),
                None => return Ok(Vec::new()),
            }
        };
        self.load(&session_id, generation).await
    }

    async fn load(&self, session_id: &str, generation: u64) -> Result<Vec<Message>> {
        {
            let mut log = self.inner.log.write().await;
            if log.is_current(session_id, generation) {
                log.begin_fetch();
            }
        }

        let records = match self.inner.table.list_for_session(session_id).await {
            Ok(records) => records,
            Err(e) => {
                let mut log = self.inner.log.write().await;
                if log.is_current(session_id, generation) {
                    log.cancel_fetch();
                }
                return Err(e);
            }
        };
        let messages: Vec<Message> = records.iter().map(parse_record).collect();

        {
            let mut log = self.inner.log.write().await;
            if !log.is_current(session_id, generation) {
                tracing::warn!(
                    "[MessageStore] Discarding stale history for session {}",
                    session_id
                );
                return Ok(messages);
            }
            log.replace_confirmed(messages.clone());
        }

        tracing::debug!(
            "[MessageStore] Loaded {} messages for session {}",
            messages.len(),
            session_id
        );
        self.inner.emit_changed(session_id);
        Ok(messages)
    }

    // ============================================================================
    // Context pinning
    // ============================================================================

    pub async fn pin_for_context(&self, id: &MessageId) -> Result<()> {
        let session_id = {
            let mut log = self.inner.log.write().await;
            log.pin(id)?;
            log.session_id().map(str::to_string)
        };
        self.inner.emit(StoreEvent::MessagesChanged { session_id });
        Ok(())
    }

    /// Returns false if the message was not pinned.
    pub async fn unpin(&self, id: &MessageId) -> bool {
        let (removed, session_id) = {
            let mut log = self.inner.log.write().await;
            (log.unpin(id), log.session_id().map(str::to_string))
        };
        if removed {
            self.inner.emit(StoreEvent::MessagesChanged { session_id });
        }
        removed
    }

    // ============================================================================
    // Sending
    // ============================================================================

    /// Sends one user message to the agent.
    ///
    /// Blank text and a missing identity are rejected before anything is
    /// rendered. Without an active session one is created first. The user's
    /// text is shown immediately as a pending entry; the outcome is either
    /// the agent's reply or a system notice, never both.
    pub async fn send_user_message(&self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject("Type a message before sending."));
        }
        let Some(user) = self.sessions.current_user().await else {
            return Err(self.reject("Sign in before sending messages."));
        };

        let session_id = self.ensure_session().await?;

        let (local_id, generation, context) = {
            let mut log = self.inner.log.write().await;
            let context = log.context();
            let message = Message::local(&session_id, SenderRole::User, text);
            let local_id = message.id.clone();
            log.push_pending(message);
            (local_id, log.generation(), context)
        };
        self.inner.emit_changed(&session_id);

        if self.persist_user_messages {
            let record = NewMessageRecord {
                session_id: session_id.clone(),
                message: StoredPayload::human_value(text),
            };
            match self.inner.table.insert(record).await {
                Ok(stored) => {
                    let mut log = self.inner.log.write().await;
                    if log.is_current(&session_id, generation) {
                        log.confirm(&local_id, parse_record(&stored));
                    }
                }
                Err(e) => {
                    return Ok(self
                        .fail_send(&session_id, generation, &local_id, e)
                        .await);
                }
            }
        }

        match self.call_agent(text, &session_id, &user.id, &context).await {
            Ok(body) => {
                let reply =
                    Message::local(&session_id, SenderRole::Agent, parse_agent_reply(&body));
                {
                    let mut log = self.inner.log.write().await;
                    if !log.is_current(&session_id, generation) {
                        tracing::warn!(
                            "[MessageStore] Discarding agent reply for session {} after switch",
                            session_id
                        );
                        return Ok(SendOutcome::Discarded);
                    }
                    log.push_local(reply.clone());
                }
                self.inner.emit_changed(&session_id);
                Ok(SendOutcome::Replied(reply))
            }
            Err(e) => Ok(self
                .fail_send(&session_id, generation, &local_id, e)
                .await),
        }
    }

    async fn call_agent(
        &self,
        text: &str,
        session_id: &str,
        user_id: &str,
        context: &[ContextMessage],
    ) -> Result<Value> {
        let request = AgentRequest::new(text, session_id, user_id, context)?;
        tracing::debug!(
            "[MessageStore] Calling agent for session {} with {} context messages",
            session_id,
            context.len()
        );
        self.agent.send(&request).await
    }

    /// Returns the active session id, creating and binding a session if needed.
    async fn ensure_session(&self) -> Result<String> {
        let session_id = match self.sessions.active_id().await {
            Some(active) => active,
            None => self.sessions.create(None).await?.id,
        };

        if self.bound_session().await.as_deref() != Some(session_id.as_str())
            && let Err(e) = self.bind(Some(&session_id)).await
        {
            tracing::warn!(
                "[MessageStore] Sending without history for session {}: {}",
                session_id,
                e
            );
        }
        Ok(session_id)
    }

    async fn fail_send(
        &self,
        session_id: &str,
        generation: u64,
        local_id: &MessageId,
        error: FanyaError,
    ) -> SendOutcome {
        tracing::error!(
            "[MessageStore] Send failed for session {}: {}",
            session_id,
            error
        );
        {
            let mut log = self.inner.log.write().await;
            if !log.is_current(session_id, generation) {
                return SendOutcome::Discarded;
            }
            log.remove(local_id);
            log.push_local(Message::local(
                session_id,
                SenderRole::System,
                format!("Failed to reach the agent: {}", error.user_message()),
            ));
        }
        self.inner.emit_changed(session_id);
        SendOutcome::Failed(error)
    }

    fn reject(&self, message: &str) -> FanyaError {
        self.inner.emit(StoreEvent::Alert {
            message: message.to_string(),
        });
        FanyaError::validation(message)
    }
}
