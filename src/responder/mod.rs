//! Responder seam
//!
//! The external text generator that answers each user turn. The controller
//! only sees this trait; the Gemini HTTP client is one implementation.

pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiResponder;

/// Responder errors
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),
    #[error("No response content from model")]
    EmptyResponse,
}

impl From<reqwest::Error> for ResponderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResponderError::Timeout
        } else {
            ResponderError::Http(e.to_string())
        }
    }
}

/// A text generator holding per-conversation sessions.
///
/// A session carries whatever context the service needs to continue the
/// conversation from the point it was started. It is shared between the
/// calls made for one conversation, which may overlap.
#[async_trait]
pub trait Responder: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    /// Begin a fresh session with no prior context.
    fn start_session(&self) -> Self::Session;

    /// Send one user turn and wait for the reply text.
    async fn send(&self, session: &Self::Session, text: &str) -> Result<String, ResponderError>;
}
