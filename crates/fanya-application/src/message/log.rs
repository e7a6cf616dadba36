//! Rendered message log for one bound session.
//!
//! Entries are kept in two segments: confirmed entries in ascending server-id
//! order, then optimistic and local-only entries in the order they were
//! added. Every confirmed insert (fetched history, push events, persisted
//! sends) goes through [`MessageLog::apply_remote`].
//!
//! A history fetch replaces the whole log. Rows delivered while the fetch
//! is in flight are recorded and re-applied on top of the fetched rows.

use fanya_core::error::{FanyaError, Result};
use fanya_core::message::{ContextMessage, LogEntry, Message, MessageId, SenderRole};
use fanya_core::reconcile::{MergeOutcome, merge_in_place};

#[derive(Debug, Default)]
pub struct MessageLog {
    session_id: Option<String>,
    generation: u64,
    confirmed: Vec<LogEntry>,
    tail: Vec<LogEntry>,
    pinned: Vec<MessageId>,
    in_flight: Option<Vec<Message>>,
}

impl MessageLog {
    /// Clears the log for a new binding and returns its generation.
    pub fn reset(&mut self, session_id: Option<String>) -> u64 {
        self.generation += 1;
        self.session_id = session_id;
        self.confirmed.clear();
        self.tail.clear();
        self.pinned.clear();
        self.in_flight = None;
        self.generation
    }

    /// Starts recording remote rows until the next [`MessageLog::replace_confirmed`].
    pub fn begin_fetch(&mut self) {
        self.in_flight = Some(Vec::new());
    }

    /// Stops recording after a failed fetch.
    pub fn cancel_fetch(&mut self) {
        self.in_flight = None;
    }

    /// Replaces the log with fetched history.
    ///
    /// Optimistic and local-only entries are dropped along with their pins.
    /// Rows recorded since [`MessageLog::begin_fetch`] are applied again so a
    /// push that beat the fetch response is kept.
    pub fn replace_confirmed(&mut self, fetched: Vec<Message>) {
        let pushed = self.in_flight.take().unwrap_or_default();
        self.confirmed.clear();
        self.tail.clear();
        for message in fetched.into_iter().chain(pushed) {
            self.apply_remote(message);
        }
        let confirmed = &self.confirmed;
        self.pinned
            .retain(|pinned| confirmed.iter().any(|e| e.id() == pinned));
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a result tagged with `session_id` and `generation` still applies.
    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.generation == generation && self.session_id() == Some(session_id)
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.confirmed.iter().chain(&self.tail).cloned().collect()
    }

    pub fn pinned(&self) -> &[MessageId] {
        &self.pinned
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.confirmed.iter().chain(&self.tail).any(|e| e.id() == id)
    }

    /// Adds a storage-backed message. Returns false if its id is already present.
    ///
    /// A user message also confirms the oldest pending entry with the same
    /// text, which then leaves the optimistic tail.
    pub fn apply_remote(&mut self, message: Message) -> bool {
        if let Some(recorded) = self.in_flight.as_mut() {
            recorded.push(message.clone());
        }
        if self.contains(&message.id) {
            return false;
        }

        if message.sender_role == SenderRole::User
            && let Some(index) = self
                .tail
                .iter()
                .position(|e| e.is_pending() && e.message.content == message.content)
        {
            let pending = self.tail.remove(index);
            self.transfer_pin(pending.id(), &message.id);
        }

        self.insert_confirmed(message);
        true
    }

    /// Replaces the pending entry `local_id` with its stored counterpart.
    pub fn confirm(&mut self, local_id: &MessageId, message: Message) {
        if let Some(recorded) = self.in_flight.as_mut() {
            recorded.push(message.clone());
        }
        if let Some(index) = self.tail.iter().position(|e| e.id() == local_id) {
            self.tail.remove(index);
            self.transfer_pin(local_id, &message.id);
        }
        if !self.contains(&message.id) {
            self.insert_confirmed(message);
        }
    }

    pub fn push_pending(&mut self, message: Message) {
        merge_in_place(&mut self.tail, LogEntry::pending(message), |e| {
            e.id().clone()
        });
    }

    pub fn push_local(&mut self, message: Message) {
        merge_in_place(&mut self.tail, LogEntry::local_only(message), |e| {
            e.id().clone()
        });
    }

    pub fn remove(&mut self, id: &MessageId) -> Option<LogEntry> {
        self.pinned.retain(|pinned| pinned != id);
        if let Some(index) = self.tail.iter().position(|e| e.id() == id) {
            return Some(self.tail.remove(index));
        }
        let index = self.confirmed.iter().position(|e| e.id() == id)?;
        Some(self.confirmed.remove(index))
    }

    /// Marks a message as agent context. Pinning twice is a no-op.
    pub fn pin(&mut self, id: &MessageId) -> Result<()> {
        if !self.contains(id) {
            return Err(FanyaError::not_found("Message", id.to_string()));
        }
        if !self.pinned.contains(id) {
            self.pinned.push(id.clone());
        }
        Ok(())
    }

    pub fn unpin(&mut self, id: &MessageId) -> bool {
        let before = self.pinned.len();
        self.pinned.retain(|pinned| pinned != id);
        self.pinned.len() != before
    }

    /// Pinned messages in log order.
    pub fn context(&self) -> Vec<ContextMessage> {
        self.confirmed
            .iter()
            .chain(&self.tail)
            .filter(|e| self.pinned.contains(e.id()))
            .map(|e| ContextMessage::from(&e.message))
            .collect()
    }

    fn insert_confirmed(&mut self, message: Message) {
        let outcome = merge_in_place(&mut self.confirmed, LogEntry::confirmed(message), |e| {
            e.id().clone()
        });
        if outcome == MergeOutcome::Inserted {
            self.confirmed.sort_by_key(|e| e.id().server_id());
        }
    }

    fn transfer_pin(&mut self, from: &MessageId, to: &MessageId) {
        for pinned in self.pinned.iter_mut() {
            if *pinned == *from {
                *pinned = to.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanya_core::message::EntryState;

    fn stored(id: i64, role: SenderRole, content: &str) -> Message {
        Message {
            id: MessageId::Server(id),
            session_id: "s-1".to_string(),
            sender_role: role,
            content: content.to_string(),
        }
    }

    fn bound() -> MessageLog {
        let mut log = MessageLog::default();
        log.reset(Some("s-1".to_string()));
        log
    }

    fn ids(log: &MessageLog) -> Vec<String> {
        log.entries().iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_duplicate_push_is_ignored() {
        let mut log = bound();
        assert!(log.apply_remote(stored(5, SenderRole::Agent, "hi")));
        assert!(!log.apply_remote(stored(5, SenderRole::Agent, "hi")));
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_confirmed_entries_sorted_by_server_id() {
        let mut log = bound();
        log.apply_remote(stored(7, SenderRole::Agent, "b"));
        log.apply_remote(stored(3, SenderRole::User, "a"));
        log.apply_remote(stored(9, SenderRole::Agent, "c"));
        assert_eq!(ids(&log), vec!["3", "7", "9"]);
    }

    #[test]
    fn test_push_confirms_oldest_matching_pending_entry() {
        let mut log = bound();
        let first = Message::local("s-1", SenderRole::User, "same");
        let second = Message::local("s-1", SenderRole::User, "same");
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        log.push_pending(first);
        log.push_pending(second);
        log.pin(&first_id).unwrap();

        log.apply_remote(stored(10, SenderRole::User, "same"));

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id(), &MessageId::Server(10));
        assert_eq!(entries[0].state, EntryState::Confirmed);
        assert_eq!(entries[1].id(), &second_id);
        assert!(entries[1].is_pending());
        assert_eq!(log.pinned(), &[MessageId::Server(10)]);
    }

    #[test]
    fn test_agent_rows_never_confirm_pending_entries() {
        let mut log = bound();
        log.push_pending(Message::local("s-1", SenderRole::User, "ping"));
        log.apply_remote(stored(11, SenderRole::Agent, "ping"));
        assert_eq!(log.entries().len(), 2);
        assert!(log.entries()[1].is_pending());
    }

    #[test]
    fn test_confirm_after_push_already_matched() {
        let mut log = bound();
        let pending = Message::local("s-1", SenderRole::User, "hello");
        let local_id = pending.id.clone();
        log.push_pending(pending);

        log.apply_remote(stored(4, SenderRole::User, "hello"));
        log.confirm(&local_id, stored(4, SenderRole::User, "hello"));

        assert_eq!(ids(&log), vec!["4"]);
    }

    #[test]
    fn test_local_entries_stay_after_confirmed_segment() {
        let mut log = bound();
        log.apply_remote(stored(1, SenderRole::User, "a"));
        let reply = Message::local("s-1", SenderRole::Agent, "direct");
        let reply_id = reply.id.to_string();
        log.push_local(reply);
        log.apply_remote(stored(2, SenderRole::Agent, "direct"));

        assert_eq!(ids(&log), vec!["1".to_string(), "2".to_string(), reply_id]);
    }

    #[test]
    fn test_pin_requires_known_message_and_context_follows_log_order() {
        let mut log = bound();
        log.apply_remote(stored(1, SenderRole::User, "first"));
        log.apply_remote(stored(2, SenderRole::Agent, "second"));

        assert!(log.pin(&MessageId::Server(99)).unwrap_err().is_not_found());

        log.pin(&MessageId::Server(2)).unwrap();
        log.pin(&MessageId::Server(1)).unwrap();
        log.pin(&MessageId::Server(1)).unwrap();
        let context = log.context();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].content, "first");
        assert_eq!(context[1].role, SenderRole::Agent);

        assert!(log.unpin(&MessageId::Server(1)));
        assert!(!log.unpin(&MessageId::Server(1)));
        assert_eq!(log.context().len(), 1);
    }

    #[test]
    fn test_reset_bumps_generation_and_clears() {
        let mut log = bound();
        log.apply_remote(stored(1, SenderRole::User, "a"));
        log.pin(&MessageId::Server(1)).unwrap();
        let generation = log.generation();

        let next = log.reset(Some("s-2".to_string()));
        assert_eq!(next, generation + 1);
        assert!(log.entries().is_empty());
        assert!(log.pinned().is_empty());
        assert!(!log.is_current("s-1", generation));
        assert!(log.is_current("s-2", next));
    }

    #[test]
    fn test_replace_drops_optimistic_entries_and_stale_rows() {
        let mut log = bound();
        log.apply_remote(stored(1, SenderRole::User, "gone"));
        log.apply_remote(stored(2, SenderRole::Agent, "kept"));
        log.pin(&MessageId::Server(1)).unwrap();
        log.pin(&MessageId::Server(2)).unwrap();
        let pending = Message::local("s-1", SenderRole::User, "hi");
        let pending_id = pending.id.clone();
        log.push_pending(pending);
        log.pin(&pending_id).unwrap();
        log.push_local(Message::local("s-1", SenderRole::Agent, "reply"));

        log.begin_fetch();
        log.replace_confirmed(vec![stored(2, SenderRole::Agent, "kept")]);

        assert_eq!(ids(&log), vec!["2"]);
        assert_eq!(log.pinned(), &[MessageId::Server(2)]);
    }

    #[test]
    fn test_push_during_fetch_survives_replace() {
        let mut log = bound();
        log.begin_fetch();
        log.apply_remote(stored(4, SenderRole::Agent, "pushed"));

        log.replace_confirmed(vec![stored(3, SenderRole::User, "fetched")]);

        assert_eq!(ids(&log), vec!["3", "4"]);
        log.apply_remote(stored(5, SenderRole::Agent, "later"));
        log.replace_confirmed(vec![stored(3, SenderRole::User, "fetched")]);
        assert_eq!(ids(&log), vec!["3"]);
    }

    #[test]
    fn test_remove_drops_pin() {
        let mut log = bound();
        let pending = Message::local("s-1", SenderRole::User, "x");
        let id = pending.id.clone();
        log.push_pending(pending);
        log.pin(&id).unwrap();
        assert!(log.remove(&id).is_some());
        assert!(log.pinned().is_empty());
        assert!(log.remove(&id).is_none());
    }
}
