//! Conversation and turn models.
//!
//! The dataset manager exclusively owns the conversation corpus; workers
//! request turns by conversation id and phase.

use serde::{Deserialize, Serialize};

/// One multi-modal message within a conversation, plus an optional delay
/// before it is issued.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the message author (e.g. `user`).
    pub role: Option<String>,
    /// Model override for this turn.
    pub model: Option<String>,
    /// Max tokens override for this turn.
    pub max_tokens: Option<u32>,
    /// Delay before issuing this turn, in milliseconds.
    pub delay_ms: Option<u64>,
    /// Text contents.
    #[serde(default)]
    pub texts: Vec<String>,
    /// Base64 or URL image contents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Base64 or URL audio contents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<String>,
    /// Base64 or URL video contents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<String>,
}

impl Turn {
    /// Build a plain single-text user turn.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            texts: vec![content.into()],
            ..Default::default()
        }
    }

    /// Approximate client-side word count across text contents.
    pub fn word_count(&self) -> usize {
        self.texts
            .iter()
            .map(|t| t.split_whitespace().count())
            .sum()
    }
}

/// A session id plus its ordered turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            session_id: session_id.into(),
            turns,
        }
    }
}

/// One entry of the fixed-schedule timing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub conversation_id: String,
    /// Offset from schedule start at which the credit should drop, in
    /// milliseconds.
    pub delay_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_word_count() {
        let turn = Turn::text("the quick brown fox");
        assert_eq!(turn.word_count(), 4);
    }

    #[test]
    fn test_conversation_round_trip() {
        let conv = Conversation::new("session-1", vec![Turn::text("hello world")]);
        let json = serde_json::to_string(&conv).expect("serialize");
        let back: Conversation = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, conv);
    }
}
