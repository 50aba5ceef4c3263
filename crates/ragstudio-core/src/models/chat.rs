use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Field/value pairs of this message, sorted by field name.
    fn sorted_fields(&self) -> [(&'static str, &str); 2] {
        // "content" < "role"
        [("content", self.content.as_str()), ("role", self.role.as_str())]
    }
}

/// Content-derived identity of a message sequence.
///
/// Two sequences with identical messages in identical order always produce
/// the same key, in any process. Collisions between different sequences
/// are assumed not to happen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Hash an ordered message sequence.
    ///
    /// Each message contributes its sorted `(field, value)` pairs; every
    /// count and string is length-prefixed so that no two distinct
    /// sequences share an encoding.
    pub fn of(messages: &[ChatMessage]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((messages.len() as u64).to_le_bytes());
        for message in messages {
            let fields = message.sorted_fields();
            hasher.update((fields.len() as u64).to_le_bytes());
            for (name, value) in fields {
                update_len_prefixed(&mut hasher, name);
                update_len_prefixed(&mut hasher, value);
            }
        }
        RecordKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn update_len_prefixed(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// A stored conversation state: a full thread prefix plus one
/// question/answer pair, keyed by the hash of its messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub key: RecordKey,
    pub messages: Vec<ChatMessage>,
}

impl ChatRecord {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            key: RecordKey::of(&messages),
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sequences_share_a_key() {
        let a = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let b = a.clone();
        assert_eq!(RecordKey::of(&a), RecordKey::of(&b));
    }

    #[test]
    fn order_matters() {
        let a = vec![ChatMessage::user("one"), ChatMessage::user("two")];
        let b = vec![ChatMessage::user("two"), ChatMessage::user("one")];
        assert_ne!(RecordKey::of(&a), RecordKey::of(&b));
    }

    #[test]
    fn role_is_part_of_identity() {
        let a = vec![ChatMessage::user("same text")];
        let b = vec![ChatMessage::assistant("same text")];
        assert_ne!(RecordKey::of(&a), RecordKey::of(&b));
    }

    #[test]
    fn content_boundaries_are_unambiguous() {
        let a = vec![ChatMessage::user("ab"), ChatMessage::user("c")];
        let b = vec![ChatMessage::user("a"), ChatMessage::user("bc")];
        assert_ne!(RecordKey::of(&a), RecordKey::of(&b));
    }

    #[test]
    fn empty_sequence_has_stable_key() {
        assert_eq!(RecordKey::of(&[]), RecordKey::of(&[]));
        assert_eq!(RecordKey::of(&[]).as_str().len(), 64);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("x")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"x"}"#);
    }
}
