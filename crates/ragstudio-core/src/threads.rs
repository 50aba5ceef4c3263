//! Per-user conversation threads, addressed by content.
//!
//! Each user has a latest-first list of [`ChatRecord`]s and a set of live
//! record keys. Extending a record retires the record it extended, so a
//! user who keeps re-asking from an old point in a conversation ends up
//! with one live continuation per prefix instead of an ever-growing pile
//! of near-duplicates.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::models::chat::{ChatMessage, ChatRecord, RecordKey};

/// One user's records. Entries whose key is not live are invisible to
/// readers and are dropped by [`UserThreadTable::compact`].
#[derive(Debug, Default, Clone)]
pub struct UserThreadTable {
    live: HashSet<RecordKey>,
    records: VecDeque<ChatRecord>,
}

impl UserThreadTable {
    pub fn update(
        &mut self,
        prev_messages: &[ChatMessage],
        new_question: ChatMessage,
        new_answer: ChatMessage,
    ) -> RecordKey {
        // Supersession keys on the exact previous record, not on prefixes.
        let prev_key = RecordKey::of(prev_messages);
        self.live.remove(&prev_key);

        let mut messages = Vec::with_capacity(prev_messages.len() + 2);
        messages.extend_from_slice(prev_messages);
        messages.push(new_question);
        messages.push(new_answer);
        let record = ChatRecord::new(messages);
        let key = record.key.clone();

        // A key that was recorded before keeps a single entry, now at the front.
        self.records.retain(|r| r.key != key);
        self.live.insert(key.clone());
        self.records.push_front(record);
        key
    }

    /// Live records, most recent first.
    pub fn records(&self) -> Vec<ChatRecord> {
        self.records
            .iter()
            .filter(|r| self.live.contains(&r.key))
            .cloned()
            .collect()
    }

    pub fn is_live(&self, key: &RecordKey) -> bool {
        self.live.contains(key)
    }

    pub fn compact(&mut self) {
        let live = &self.live;
        self.records.retain(|r| live.contains(&r.key));
    }

    /// Entries held in memory, including superseded ones not yet compacted.
    pub fn stored_len(&self) -> usize {
        self.records.len()
    }
}

/// Thread tables for every user seen by this process.
#[derive(Debug, Default, Clone)]
pub struct ConversationThreadStore {
    users: HashMap<String, UserThreadTable>,
}

impl ConversationThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `prev_messages` was extended by one question/answer pair.
    ///
    /// Returns the key of the new record.
    pub fn update(
        &mut self,
        user_id: &str,
        prev_messages: &[ChatMessage],
        new_question: ChatMessage,
        new_answer: ChatMessage,
    ) -> RecordKey {
        debug!(
            user_id,
            prev_messages = prev_messages.len(),
            "updating chat history"
        );
        self.users
            .entry(user_id.to_string())
            .or_default()
            .update(prev_messages, new_question, new_answer)
    }

    /// Live records for a user, most recent first. Unknown users have an
    /// empty history.
    pub fn read(&self, user_id: &str) -> Vec<ChatRecord> {
        self.users
            .get(user_id)
            .map(UserThreadTable::records)
            .unwrap_or_default()
    }

    pub fn compact(&mut self, user_id: &str) {
        if let Some(table) = self.users.get_mut(user_id) {
            table.compact();
        }
    }

    pub fn table(&self, user_id: &str) -> Option<&UserThreadTable> {
        self.users.get(user_id)
    }
}
