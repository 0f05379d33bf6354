//! Persistent storage
//!
//! This module handles all data persistence for conversations and settings.

pub mod conversations;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing files on disk
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Could not determine the application data directory")]
    DataDirUnavailable,
}

/// Platform data directory for the application (created on demand by writers)
pub fn get_data_dir() -> Result<PathBuf, StorageError> {
    directories::ProjectDirs::from("com", "chatrs", "chatrs")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StorageError::DataDirUnavailable)
}
