//! Per-sender conversation memory
//!
//! Each sender keeps only its most recent turns. The store is an injected
//! state object behind [`ConversationStore`]; the in-memory implementation
//! lives for the life of the process and is never persisted.

use crate::llm::MessageRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Turns kept per sender; the oldest is dropped on overflow
pub const MAX_TURNS: usize = 10;

/// One user or assistant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: MessageRole::User,
            text: text.into(),
            timestamp,
        }
    }

    pub fn assistant(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: MessageRole::Assistant,
            text: text.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    turns: VecDeque<Turn>,
    #[allow(dead_code)] // Kept for stores that expire idle senders
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            turns: VecDeque::with_capacity(MAX_TURNS + 1),
            last_activity: now,
        }
    }

    pub fn push(&mut self, turn: Turn, now: DateTime<Utc>) {
        self.turns.push_back(turn);
        while self.turns.len() > MAX_TURNS {
            self.turns.pop_front();
        }
        self.last_activity = now;
    }

    /// Turns, oldest first
    pub fn history(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }
}

/// Keyed conversation state. Callers only use `append`, which is written in
/// terms of `get` and `set` (last write wins).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, sender_id: &str) -> Option<Conversation>;

    async fn set(&self, sender_id: &str, conversation: Conversation);

    /// Drop a sender's history. Returns whether anything was stored.
    async fn evict(&self, sender_id: &str) -> bool;

    /// Record a turn and return the trimmed history including it
    async fn append(&self, sender_id: &str, turn: Turn) -> Vec<Turn> {
        let now = Utc::now();
        let mut conversation = self
            .get(sender_id)
            .await
            .unwrap_or_else(|| Conversation::new(now));
        conversation.push(turn, now);
        let history = conversation.history();
        self.set(sender_id, conversation).await;
        history
    }
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn sender_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, sender_id: &str) -> Option<Conversation> {
        self.conversations.read().await.get(sender_id).cloned()
    }

    async fn set(&self, sender_id: &str, conversation: Conversation) {
        self.conversations
            .write()
            .await
            .insert(sender_id.to_string(), conversation);
    }

    async fn evict(&self, sender_id: &str) -> bool {
        self.conversations.write().await.remove(sender_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn append_creates_and_accumulates() {
        let store = InMemoryConversationStore::new();

        let history = store.append("alice", Turn::user("hi", at(1))).await;
        assert_eq!(history, vec![Turn::user("hi", at(1))]);

        let history = store
            .append("alice", Turn::assistant("hello", at(2)))
            .await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(store.sender_count().await, 1);
    }

    #[tokio::test]
    async fn senders_are_isolated() {
        let store = InMemoryConversationStore::new();
        store.append("alice", Turn::user("a", at(1))).await;
        store.append("bob", Turn::user("b", at(1))).await;

        let alice = store.get("alice").await.unwrap();
        assert_eq!(alice.history(), vec![Turn::user("a", at(1))]);
        assert_eq!(store.sender_count().await, 2);
    }

    #[tokio::test]
    async fn append_caps_history_at_max_turns() {
        let store = InMemoryConversationStore::new();
        let mut last = Vec::new();
        for i in 0..25 {
            last = store
                .append("alice", Turn::user(format!("m{i}"), at(i)))
                .await;
        }
        assert_eq!(last.len(), MAX_TURNS);
        assert_eq!(last.first().unwrap().text, "m15");
        assert_eq!(last.last().unwrap().text, "m24");
        assert_eq!(
            store.get("alice").await.unwrap().history().len(),
            MAX_TURNS
        );
    }

    #[tokio::test]
    async fn evict_forgets_sender() {
        let store = InMemoryConversationStore::new();
        store.append("alice", Turn::user("hi", at(1))).await;

        assert!(store.evict("alice").await);
        assert!(!store.evict("alice").await);
        assert!(store.get("alice").await.is_none());

        let history = store.append("alice", Turn::user("again", at(2))).await;
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn push_stamps_last_activity() {
        let mut conversation = Conversation::new(at(0));
        conversation.push(Turn::user("hi", at(5)), at(7));
        assert_eq!(conversation.last_activity, at(7));
    }

    proptest! {
        #[test]
        fn history_is_the_most_recent_turns_in_order(
            texts in prop::collection::vec("[a-z]{1,8}", 0..40)
        ) {
            let mut conversation = Conversation::new(at(0));
            for (i, text) in texts.iter().enumerate() {
                let ts = at(i64::try_from(i).unwrap());
                conversation.push(Turn::user(text.clone(), ts), ts);
            }

            let history: Vec<String> = conversation.history().into_iter().map(|t| t.text).collect();
            let expected: Vec<String> = texts
                .iter()
                .skip(texts.len().saturating_sub(MAX_TURNS))
                .cloned()
                .collect();

            prop_assert!(history.len() <= MAX_TURNS);
            prop_assert_eq!(history, expected);
        }
    }
}
