//! Message types
//!
//! Defines chat message structures and senders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::timestamp;

/// Who wrote a message.
///
/// Stored as a plain string tag. Tags other than `"user"` and `"assistant"`
/// (older files use `"gemini"`) are kept verbatim so a reload writes them back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sender {
    /// Message typed by the user
    User,
    /// Reply produced by the responder
    Assistant,
    /// Any other tag found on disk
    Other(String),
}

impl Sender {
    pub fn as_tag(&self) -> &str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
            Sender::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "user" => Sender::User,
            "assistant" => Sender::Assistant,
            other => Sender::Other(other.to_string()),
        }
    }

    /// Whether the message came from the model side of the conversation.
    pub fn is_reply(&self) -> bool {
        !matches!(self, Sender::User)
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Sender::from_tag(&tag))
    }
}

/// A single chat message
///
/// The message id is the key of the owning conversation's message map and is
/// not repeated inside the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The content of the message
    pub text: String,
    /// Who sent the message
    pub sender: Sender,
    /// When the message was appended
    #[serde(default, with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            created_at: timestamp::now(),
        }
    }
}
