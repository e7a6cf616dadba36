//! In-process backend implementing the storage and push-feed ports.
//!
//! `InMemoryBackend` keeps the `sessions` and `chat_messages` tables in memory
//! and fans every write out to matching subscriptions, mirroring the hosted
//! backend's row-level change feed. It backs the terminal client when no
//! hosted storage is configured and doubles as the test backend.

use async_trait::async_trait;
use chrono::Utc;
use fanya_core::error::{FanyaError, Result};
use fanya_core::message::{MessageTable, NewMessageRecord, RawStoredRecord};
use fanya_core::realtime::{ChangeEvent, RealtimeBackend, Subscription, SubscriptionId, Topic};
use fanya_core::session::{NewSession, Session, SessionPatch, SessionTable};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};

#[derive(Default)]
struct Tables {
    sessions: Vec<Session>,
    messages: Vec<RawStoredRecord>,
    last_message_id: i64,
}

struct Subscriber {
    id: SubscriptionId,
    topic: Topic,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscription: AtomicU64,
    offline: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Topics with an open subscription, in subscription order.
    pub async fn subscribed_topics(&self) -> Vec<Topic> {
        self.subscribers
            .lock()
            .await
            .iter()
            .map(|s| s.topic.clone())
            .collect()
    }

    /// Writes a row as another producer would (e.g. the agent's memory).
    ///
    /// Ignores the offline switch.
    pub async fn append_message(&self, session_id: &str, message: Value) -> RawStoredRecord {
        let record = {
            let mut tables = self.tables.lock().await;
            tables.last_message_id += 1;
            let record = RawStoredRecord {
                id: tables.last_message_id,
                session_id: session_id.to_string(),
                message,
            };
            tables.messages.push(record.clone());
            record
        };
        self.publish(ChangeEvent::MessageInserted(record.clone()))
            .await;
        record
    }

    /// Re-delivers an event to matching subscribers without touching the tables.
    pub async fn redeliver(&self, event: ChangeEvent) {
        self.publish(event).await;
    }

    /// Removes a session row, as an administrative delete would.
    pub async fn delete_session(&self, session_id: &str) -> Option<Session> {
        let removed = {
            let mut tables = self.tables.lock().await;
            let index = tables.sessions.iter().position(|s| s.id == session_id)?;
            tables.sessions.remove(index)
        };
        self.publish(ChangeEvent::SessionDeleted {
            id: removed.id.clone(),
            user_id: removed.user_id.clone(),
        })
        .await;
        Some(removed)
    }

    fn ensure_online(&self, operation: &str) -> Result<()> {
        if self.is_offline() {
            return Err(FanyaError::transport(operation, "backend is offline"));
        }
        Ok(())
    }

    async fn publish(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|subscriber| {
            if !subscriber.topic.matches(&event) {
                return true;
            }
            subscriber.sender.send(event.clone()).is_ok()
        });
    }
}

#[async_trait]
impl SessionTable for InMemoryBackend {
    async fn list_for_user(&self, user_id: &str, include_archived: bool) -> Result<Vec<Session>> {
        self.ensure_online("list sessions")?;
        let tables = self.tables.lock().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && (include_archived || !s.archived))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(sessions)
    }

    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        self.ensure_online("find session")?;
        let tables = self.tables.lock().await;
        Ok(tables.sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn insert(&self, session: NewSession) -> Result<Session> {
        self.ensure_online("create session")?;
        let stored = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: session.user_id,
            name: session.name,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            archived: false,
        };
        self.tables.lock().await.sessions.push(stored.clone());
        tracing::debug!("[InMemoryBackend] Inserted session {}", stored.id);
        self.publish(ChangeEvent::SessionUpserted(stored.clone()))
            .await;
        Ok(stored)
    }

    async fn update(&self, session_id: &str, patch: SessionPatch) -> Result<Session> {
        self.ensure_online("update session")?;
        let updated = {
            let mut tables = self.tables.lock().await;
            let session = tables
                .sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| FanyaError::not_found("Session", session_id))?;
            patch.apply_to(session);
            session.clone()
        };
        self.publish(ChangeEvent::SessionUpserted(updated.clone()))
            .await;
        Ok(updated)
    }
}

#[async_trait]
impl MessageTable for InMemoryBackend {
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<RawStoredRecord>> {
        self.ensure_online("fetch messages")?;
        let tables = self.tables.lock().await;
        let mut records: Vec<RawStoredRecord> = tables
            .messages
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn insert(&self, record: NewMessageRecord) -> Result<RawStoredRecord> {
        self.ensure_online("store message")?;
        let stored = self.append_message(&record.session_id, record.message).await;
        self.touch_session(&stored.session_id).await;
        Ok(stored)
    }
}

impl InMemoryBackend {
    async fn touch_session(&self, session_id: &str) {
        let mut tables = self.tables.lock().await;
        if let Some(session) = tables.sessions.iter_mut().find(|s| s.id == session_id) {
            session.last_activity_at = Utc::now();
        }
    }
}

#[async_trait]
impl RealtimeBackend for InMemoryBackend {
    async fn subscribe(&self, topic: Topic) -> Result<Subscription> {
        self.ensure_online("subscribe")?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let (sender, events) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(Subscriber {
            id,
            topic: topic.clone(),
            sender,
        });
        tracing::debug!("[InMemoryBackend] Subscription {} on {}", id.0, topic);
        Ok(Subscription { id, topic, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.subscribers.lock().await.retain(|s| s.id != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_orders_by_activity_and_filters_archived() {
        let backend = InMemoryBackend::new();
        let now = Utc::now();
        let older = SessionTable::insert(
            &backend,
            NewSession::new("u-1", Some("older".into()), now - Duration::minutes(5)),
        )
        .await
        .unwrap();
        let newer = SessionTable::insert(&backend, NewSession::new("u-1", None, now))
            .await
            .unwrap();
        SessionTable::insert(&backend, NewSession::new("u-2", None, now))
            .await
            .unwrap();

        let listed = backend.list_for_user("u-1", false).await.unwrap();
        assert_eq!(
            listed.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec![newer.id.as_str(), older.id.as_str()]
        );

        backend
            .update(&newer.id, SessionPatch::archived(true, now))
            .await
            .unwrap();
        assert_eq!(backend.list_for_user("u-1", false).await.unwrap().len(), 1);
        assert_eq!(backend.list_for_user("u-1", true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_session_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend
            .update("missing", SessionPatch::rename("x", Utc::now()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_message_ids_are_monotonic_and_fanned_out() {
        let backend = InMemoryBackend::new();
        let mut subscription = backend
            .subscribe(Topic::session_messages("s-1"))
            .await
            .unwrap();

        let first = MessageTable::insert(
            &backend,
            NewMessageRecord {
                session_id: "s-1".to_string(),
                message: json!({"type": "human", "content": "a"}),
            },
        )
        .await
        .unwrap();
        backend.append_message("s-2", json!({"type": "human"})).await;
        let third = backend.append_message("s-1", json!({"type": "ai"})).await;

        assert!(third.id > first.id);
        assert_eq!(backend.list_for_session("s-1").await.unwrap().len(), 2);

        let delivered = subscription.events.recv().await.unwrap();
        assert_eq!(delivered, ChangeEvent::MessageInserted(first));
        let delivered = subscription.events.recv().await.unwrap();
        assert_eq!(delivered, ChangeEvent::MessageInserted(third));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let backend = InMemoryBackend::new();
        let mut subscription = backend
            .subscribe(Topic::session_messages("s-1"))
            .await
            .unwrap();
        backend.unsubscribe(subscription.id).await.unwrap();
        assert_eq!(backend.subscriber_count().await, 0);

        backend.append_message("s-1", json!({"type": "human"})).await;
        assert!(subscription.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_offline_calls_fail_with_transport() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);
        assert!(backend.list_for_user("u-1", false).await.unwrap_err().is_transport());
        assert!(backend
            .subscribe(Topic::user_sessions("u-1"))
            .await
            .unwrap_err()
            .is_transport());

        backend.set_offline(false);
        assert!(backend.list_for_user("u-1", false).await.is_ok());
    }
}
