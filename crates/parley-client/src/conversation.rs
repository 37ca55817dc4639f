//! Conversation state reducer.
//!
//! Folds inbound room events into the message log, the online user list, and
//! the typing set. Every transition is a pure state update; the reducer is
//! the only writer of this state and renderers read it through shared
//! references.

use std::{collections::HashSet, fmt::Debug, ops::Sub, time::Duration};

use parley_proto::{MessageId, MessageRecord};

/// Input to [`Conversation::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent<I> {
    /// Full history; replaces the log.
    HistoryLoaded(Vec<MessageRecord>),
    /// One new user, file, or system message.
    MessageReceived(MessageRecord),
    /// A file was deleted; drop every message carrying the key.
    FileDeleted(String),
    /// Current participants; replaces the list.
    PresenceUpdated(Vec<String>),
    /// A participant started typing.
    TypingStarted {
        /// Display name
        name: String,
        /// Arrival time, used for expiry
        at: I,
    },
    /// A participant stopped typing.
    TypingStopped(String),
    /// Drop typing entries not refreshed within `ttl`.
    ExpireTyping {
        /// Current time
        now: I,
        /// Maximum age of an entry
        ttl: Duration,
    },
    /// The channel dropped; typing state is no longer trustworthy.
    ChannelLost,
}

/// Display names currently typing, in the order they started.
///
/// Keyed by name: a repeated start refreshes the entry in place.
#[derive(Debug, Clone)]
pub struct TypingSet<I> {
    entries: Vec<(String, I)>,
}

impl<I> Default for TypingSet<I> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<I> TypingSet<I>
where
    I: Copy + Sub<Output = Duration>,
{
    /// Add or refresh a name.
    pub fn start(&mut self, name: String, at: I) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = at;
            return false;
        }
        self.entries.push((name, at));
        true
    }

    /// Remove a name. Removing an absent name is a no-op.
    pub fn stop(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Drop entries older than `ttl`.
    pub fn expire(&mut self, now: I, ttl: Duration) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, at)| now - *at < ttl);
        self.entries.len() != before
    }

    /// Remove everything.
    pub fn clear(&mut self) -> bool {
        let changed = !self.entries.is_empty();
        self.entries.clear();
        changed
    }

    /// Names in start order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Whether `name` is typing.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is typing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Message log, presence, and typing state of one room.
#[derive(Debug, Clone)]
pub struct Conversation<I> {
    messages: Vec<MessageRecord>,
    ids: HashSet<MessageId>,
    loaded: bool,
    users: Vec<String>,
    typing: TypingSet<I>,
}

impl<I> Default for Conversation<I> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            ids: HashSet::new(),
            loaded: false,
            users: Vec::new(),
            typing: TypingSet::default(),
        }
    }
}

impl<I> Conversation<I>
where
    I: Copy + Debug + Sub<Output = Duration>,
{
    /// Empty, not-yet-loaded conversation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in arrival order.
    pub fn messages(&self) -> &[MessageRecord] {
        &self.messages
    }

    /// Whether history has been received. Distinguishes "loading" from
    /// "no messages yet".
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Online participants, as last reported.
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Participants currently typing.
    pub fn typing(&self) -> &TypingSet<I> {
        &self.typing
    }

    /// Find the message carrying a file key.
    pub fn file_message(&self, key: &str) -> Option<&MessageRecord> {
        self.messages.iter().find(|m| m.file_key() == Some(key))
    }

    /// Apply one event. Returns whether visible state changed.
    pub fn apply(&mut self, event: ConversationEvent<I>) -> bool {
        match event {
            ConversationEvent::HistoryLoaded(batch) => {
                self.messages.clear();
                self.ids.clear();
                for message in batch {
                    if !message.is_well_formed() {
                        tracing::warn!(id = %message.id, kind = ?message.kind, "malformed history entry dropped");
                    } else if self.ids.insert(message.id.clone()) {
                        self.messages.push(message);
                    } else {
                        tracing::warn!(id = %message.id, "duplicate id in history, dropped");
                    }
                }
                self.loaded = true;
                tracing::debug!(count = self.messages.len(), "history loaded");
                true
            },
            ConversationEvent::MessageReceived(message) => {
                if !message.is_well_formed() {
                    tracing::warn!(id = %message.id, kind = ?message.kind, "malformed message dropped");
                    return false;
                }
                if !self.ids.insert(message.id.clone()) {
                    tracing::warn!(id = %message.id, "duplicate message ignored");
                    return false;
                }
                self.messages.push(message);
                true
            },
            ConversationEvent::FileDeleted(key) => {
                let before = self.messages.len();
                let ids = &mut self.ids;
                self.messages.retain(|m| {
                    let keep = m.file_key() != Some(key.as_str());
                    if !keep {
                        ids.remove(&m.id);
                    }
                    keep
                });
                self.messages.len() != before
            },
            ConversationEvent::PresenceUpdated(users) => {
                if self.users == users {
                    return false;
                }
                self.users = users;
                true
            },
            ConversationEvent::TypingStarted { name, at } => self.typing.start(name, at),
            ConversationEvent::TypingStopped(name) => self.typing.stop(&name),
            ConversationEvent::ExpireTyping { now, ttl } => self.typing.expire(now, ttl),
            ConversationEvent::ChannelLost => self.typing.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use parley_proto::FileAttachment;

    use super::*;

    fn file(id: u64, key: &str) -> MessageRecord {
        let attachment = FileAttachment {
            key: key.into(),
            name: format!("{key}.bin"),
            size: 1,
            uploader_id: None,
            content_type: None,
        };
        MessageRecord::file(id, "alice", attachment, 0)
    }

    #[test]
    fn starts_unloaded_and_empty_history_marks_loaded() {
        let mut conv = Conversation::<Instant>::new();
        assert!(!conv.is_loaded());

        conv.apply(ConversationEvent::HistoryLoaded(Vec::new()));
        assert!(conv.is_loaded());
        assert!(conv.messages().is_empty());
    }

    #[test]
    fn file_deletion_removes_by_key_not_position() {
        let mut conv = Conversation::<Instant>::new();
        let m1 = MessageRecord::user(1, "a", "one", 0);
        let m2 = file(2, "k2");
        let m3 = MessageRecord::user(3, "b", "three", 0);
        conv.apply(ConversationEvent::HistoryLoaded(vec![m1.clone(), m2, m3.clone()]));

        assert!(conv.apply(ConversationEvent::FileDeleted("k2".into())));
        assert_eq!(conv.messages(), &[m1, m3]);
        assert!(!conv.apply(ConversationEvent::FileDeleted("k2".into())));
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let mut conv = Conversation::<Instant>::new();
        let m = MessageRecord::user(1, "a", "hi", 0);
        assert!(conv.apply(ConversationEvent::MessageReceived(m.clone())));
        assert!(!conv.apply(ConversationEvent::MessageReceived(m)));
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn malformed_entries_never_reach_the_log() {
        let mut conv = Conversation::<Instant>::new();
        let good = MessageRecord::user(1, "a", "one", 0);
        let mut anonymous = MessageRecord::user(2, "b", "two", 0);
        anonymous.username = None;
        let mut detached = file(3, "k3");
        detached.file = None;

        conv.apply(ConversationEvent::HistoryLoaded(vec![good.clone(), anonymous, detached.clone()]));
        assert!(conv.is_loaded());
        assert_eq!(conv.messages(), std::slice::from_ref(&good));

        detached.id = 4_u64.into();
        assert!(!conv.apply(ConversationEvent::MessageReceived(detached)));
        assert_eq!(conv.messages(), &[good]);
    }

    #[test]
    fn history_replaces_log_and_dedups_batch() {
        let mut conv = Conversation::<Instant>::new();
        conv.apply(ConversationEvent::MessageReceived(MessageRecord::user(9, "x", "old", 0)));

        let m = MessageRecord::user(1, "a", "hi", 0);
        conv.apply(ConversationEvent::HistoryLoaded(vec![m.clone(), m.clone()]));
        assert_eq!(conv.messages(), &[m]);
    }

    #[test]
    fn typing_expires_without_refresh() {
        let t0 = Instant::now();
        let mut conv = Conversation::new();
        conv.apply(ConversationEvent::TypingStarted { name: "A".into(), at: t0 });
        conv.apply(ConversationEvent::TypingStarted {
            name: "B".into(),
            at: t0 + Duration::from_secs(4),
        });

        conv.apply(ConversationEvent::ExpireTyping {
            now: t0 + Duration::from_secs(6),
            ttl: Duration::from_secs(5),
        });
        assert_eq!(conv.typing().names().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn channel_loss_clears_typing_but_keeps_log() {
        let t0 = Instant::now();
        let mut conv = Conversation::new();
        conv.apply(ConversationEvent::MessageReceived(MessageRecord::user(1, "a", "hi", 0)));
        conv.apply(ConversationEvent::TypingStarted { name: "A".into(), at: t0 });

        conv.apply(ConversationEvent::ChannelLost);
        assert!(conv.typing().is_empty());
        assert_eq!(conv.messages().len(), 1);
    }
}
