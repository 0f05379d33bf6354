//! Shared type definitions
//!
//! This module contains the records persisted in the chat history file.

pub mod conversation;
pub mod message;
pub mod timestamp;

pub use conversation::{
    Conversation, ConversationId, ConversationMap, ConversationSummary, MessageId,
};
pub use message::{Message, Sender};
