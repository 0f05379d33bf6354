//! Errors surfaced to the front-end

use thiserror::Error;

use crate::responder::ResponderError;
use crate::storage::StorageError;

/// Everything a chat operation can fail with.
///
/// None of these is fatal: the caller shows the error and keeps running.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Rejected before any state changed
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Reading or writing the history file failed; memory remains authoritative
    #[error("Failed to save chat history: {0}")]
    Persistence(#[from] StorageError),
    /// The responder call failed; nothing was appended
    #[error("Failed to get response: {0}")]
    ExternalService(#[from] ResponderError),
}
