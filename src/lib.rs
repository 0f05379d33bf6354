//! chatrs Library
//!
//! Core library for the chatrs client: conversation persistence, the chat
//! controller and the Gemini responder.

pub mod app;
pub mod chat;
pub mod error;
pub mod responder;
pub mod storage;
pub mod types;
pub mod ui;

pub use error::ChatError;
