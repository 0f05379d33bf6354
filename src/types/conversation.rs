//! Conversation types
//!
//! A conversation is an ordered, append-only sequence of messages keyed by
//! message id, plus the title shown in the conversation list.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::message::Message;
use crate::types::timestamp;

/// Title shown until a conversation has at least one message
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Maximum number of characters taken from the first message for the title
pub const TITLE_MAX_CHARS: usize = 40;

/// Marker appended to titles cut at [`TITLE_MAX_CHARS`]
pub const TITLE_ELLIPSIS: &str = "...";

pub type ConversationId = String;
pub type MessageId = String;

/// The whole history document: conversation id to conversation, in file order.
pub type ConversationMap = IndexMap<ConversationId, Conversation>;

fn default_title() -> String {
    PLACEHOLDER_TITLE.to_string()
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default, with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Messages in insertion order, keyed by message id
    #[serde(default)]
    pub messages: IndexMap<MessageId, Message>,
}

impl Conversation {
    /// Create an empty conversation with the placeholder title
    pub fn new() -> Self {
        Self {
            title: default_title(),
            created_at: timestamp::now(),
            messages: IndexMap::new(),
        }
    }

    /// Recompute the title from the first message currently present.
    pub fn refresh_title(&mut self) {
        self.title = derive_title(self.messages.values().next());
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title for a conversation whose first message is `first`.
///
/// Takes the first [`TITLE_MAX_CHARS`] characters of the trimmed text and
/// appends [`TITLE_ELLIPSIS`] only when something was cut off.
pub fn derive_title(first: Option<&Message>) -> String {
    let Some(message) = first else {
        return default_title();
    };

    let text = message.text.trim();
    match text.char_indices().nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TITLE_ELLIPSIS),
        None => text.to_string(),
    }
}

/// One row of the conversation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Sender;

    fn title_for(text: &str) -> String {
        derive_title(Some(&Message::new(text, Sender::User)))
    }

    #[test]
    fn test_placeholder_without_messages() {
        assert_eq!(derive_title(None), "New Chat");
        assert_eq!(Conversation::new().title, "New Chat");
    }

    #[test]
    fn test_short_titles_are_kept() {
        let text = "Hello there, how does this work today?";
        assert_eq!(text.chars().count(), 38);
        assert_eq!(title_for(text), text);
        assert_eq!(title_for("Hi!!!"), "Hi!!!");
    }

    #[test]
    fn test_forty_character_boundary() {
        let exactly_40 = "a".repeat(40);
        assert_eq!(title_for(&exactly_40), exactly_40);

        let forty_one = "b".repeat(41);
        assert_eq!(title_for(&forty_one), format!("{}...", "b".repeat(40)));
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let text = "é".repeat(45);
        assert_eq!(title_for(&text), format!("{}...", "é".repeat(40)));
    }

    #[test]
    fn test_refresh_uses_first_message() {
        let mut conversation = Conversation::new();
        conversation
            .messages
            .insert("m1".into(), Message::new("  first question  ", Sender::User));
        conversation
            .messages
            .insert("m2".into(), Message::new("an answer", Sender::Assistant));
        conversation.refresh_title();
        assert_eq!(conversation.title, "first question");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let conversation: Conversation = serde_json::from_str("{}").unwrap();
        assert_eq!(conversation.title, "New Chat");
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.created_at.timestamp(), 0);
    }
}
