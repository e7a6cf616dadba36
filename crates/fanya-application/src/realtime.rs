//! Lifecycle manager for push subscriptions.
//!
//! `RealtimeBridge` keeps at most one open subscription per [`TopicKind`].
//! Binding a new topic closes the previous subscription of the same kind and
//! waits for its forwarding task to finish, so once `bind` returns no event
//! from the old topic can reach a sink.

use async_trait::async_trait;
use fanya_core::error::Result;
use fanya_core::realtime::{ChangeEvent, RealtimeBackend, SubscriptionId, Topic, TopicKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Receiver of forwarded change events.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn apply_change(&self, topic: &Topic, event: ChangeEvent);
}

struct ActiveChannel {
    topic: Topic,
    subscription_id: SubscriptionId,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RealtimeBridge {
    backend: Arc<dyn RealtimeBackend>,
    channels: Mutex<HashMap<TopicKind, ActiveChannel>>,
}

impl RealtimeBridge {
    pub fn new(backend: Arc<dyn RealtimeBackend>) -> Self {
        Self {
            backend,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a subscription on `topic` and forwards its events to `sink`.
    ///
    /// Any subscription of the same kind is torn down first. The channel map
    /// stays locked for the whole call, so concurrent binds are serialized.
    pub async fn bind(&self, topic: Topic, sink: Arc<dyn ChangeSink>) -> Result<()> {
        let kind = topic.kind();
        let mut channels = self.channels.lock().await;

        if let Some(previous) = channels.remove(&kind) {
            self.close(previous).await;
        }

        let subscription = self.backend.subscribe(topic.clone()).await?;
        tracing::debug!(
            "[RealtimeBridge] Subscribed to {} (id={})",
            topic,
            subscription.id.0
        );

        let stop = CancellationToken::new();
        let task = tokio::spawn(forward(
            subscription.events,
            topic.clone(),
            sink,
            stop.clone(),
        ));

        channels.insert(
            kind,
            ActiveChannel {
                topic,
                subscription_id: subscription.id,
                stop,
                task,
            },
        );
        Ok(())
    }

    /// Closes the subscription of `kind`, if one is open.
    pub async fn unbind(&self, kind: TopicKind) {
        let previous = self.channels.lock().await.remove(&kind);
        if let Some(previous) = previous {
            self.close(previous).await;
        }
    }

    pub async fn unbind_all(&self) {
        let drained: Vec<ActiveChannel> = {
            let mut channels = self.channels.lock().await;
            channels.drain().map(|(_, channel)| channel).collect()
        };
        for channel in drained {
            self.close(channel).await;
        }
    }

    /// The topic currently bound for `kind`.
    pub async fn active_topic(&self, kind: TopicKind) -> Option<Topic> {
        self.channels
            .lock()
            .await
            .get(&kind)
            .map(|channel| channel.topic.clone())
    }

    async fn close(&self, channel: ActiveChannel) {
        channel.stop.cancel();
        if let Err(e) = self.backend.unsubscribe(channel.subscription_id).await {
            tracing::warn!(
                "[RealtimeBridge] Failed to unsubscribe from {}: {}",
                channel.topic,
                e
            );
        }
        if let Err(e) = channel.task.await {
            tracing::warn!(
                "[RealtimeBridge] Forwarding task for {} ended abnormally: {}",
                channel.topic,
                e
            );
        }
        tracing::debug!("[RealtimeBridge] Closed {}", channel.topic);
    }
}

async fn forward(
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    topic: Topic,
    sink: Arc<dyn ChangeSink>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            event = events.recv() => match event {
                Some(event) if topic.matches(&event) => sink.apply_change(&topic, event).await,
                Some(event) => {
                    tracing::warn!(
                        "[RealtimeBridge] Dropping event outside {}: {:?}",
                        topic,
                        event
                    );
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanya_core::message::RawStoredRecord;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Backend that hands out channels and keeps the senders for the test to drive.
    #[derive(Default)]
    struct ManualBackend {
        next_id: AtomicU64,
        senders: StdMutex<HashMap<u64, mpsc::UnboundedSender<ChangeEvent>>>,
        closed: StdMutex<Vec<u64>>,
    }

    impl ManualBackend {
        fn sender(&self, id: u64) -> Option<mpsc::UnboundedSender<ChangeEvent>> {
            self.senders.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl RealtimeBackend for ManualBackend {
        async fn subscribe(&self, topic: Topic) -> Result<fanya_core::realtime::Subscription> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().insert(id, tx);
            Ok(fanya_core::realtime::Subscription {
                id: SubscriptionId(id),
                topic,
                events: rx,
            })
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
            self.closed.lock().unwrap().push(id.0);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl ChangeSink for RecordingSink {
        async fn apply_change(&self, _topic: &Topic, event: ChangeEvent) {
            if let ChangeEvent::MessageInserted(record) = event {
                self.seen.lock().unwrap().push(record.id);
            }
        }
    }

    fn insert(id: i64, session_id: &str) -> ChangeEvent {
        ChangeEvent::MessageInserted(RawStoredRecord {
            id,
            session_id: session_id.to_string(),
            message: json!({"type": "human", "content": "x"}),
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_rebind_closes_previous_subscription() {
        let backend = Arc::new(ManualBackend::default());
        let bridge = RealtimeBridge::new(backend.clone());
        let sink = Arc::new(RecordingSink::default());

        bridge
            .bind(Topic::session_messages("a"), sink.clone())
            .await
            .unwrap();
        let old_sender = backend.sender(0).unwrap();

        bridge
            .bind(Topic::session_messages("b"), sink.clone())
            .await
            .unwrap();
        assert_eq!(*backend.closed.lock().unwrap(), vec![0]);

        // The old channel's task is gone, so nothing sent there is delivered.
        let _ = old_sender.send(insert(1, "a"));
        backend.sender(1).unwrap().send(insert(2, "b")).unwrap();
        settle().await;

        assert_eq!(*sink.seen.lock().unwrap(), vec![2]);
        assert_eq!(
            bridge.active_topic(TopicKind::Messages).await,
            Some(Topic::session_messages("b"))
        );
    }

    #[tokio::test]
    async fn test_kinds_are_independent() {
        let backend = Arc::new(ManualBackend::default());
        let bridge = RealtimeBridge::new(backend.clone());
        let sink = Arc::new(RecordingSink::default());

        bridge
            .bind(Topic::session_messages("a"), sink.clone())
            .await
            .unwrap();
        bridge
            .bind(Topic::user_sessions("u-1"), sink.clone())
            .await
            .unwrap();
        assert!(backend.closed.lock().unwrap().is_empty());

        bridge.unbind(TopicKind::Messages).await;
        assert_eq!(*backend.closed.lock().unwrap(), vec![0]);
        assert!(bridge.active_topic(TopicKind::Messages).await.is_none());
        assert!(bridge.active_topic(TopicKind::Sessions).await.is_some());

        bridge.unbind_all().await;
        assert!(bridge.active_topic(TopicKind::Sessions).await.is_none());
    }

    #[tokio::test]
    async fn test_events_for_other_sessions_are_dropped() {
        let backend = Arc::new(ManualBackend::default());
        let bridge = RealtimeBridge::new(backend.clone());
        let sink = Arc::new(RecordingSink::default());

        bridge
            .bind(Topic::session_messages("a"), sink.clone())
            .await
            .unwrap();
        let sender = backend.sender(0).unwrap();
        sender.send(insert(1, "other")).unwrap();
        sender.send(insert(2, "a")).unwrap();
        settle().await;

        assert_eq!(*sink.seen.lock().unwrap(), vec![2]);
    }
}
