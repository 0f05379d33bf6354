//! Settings storage
//!
//! Manages persistence of user preferences and application settings.

use crate::storage::conversations::HISTORY_FILE_NAME;
use crate::storage::{get_data_dir, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the history file location
pub const HISTORY_FILE_ENV: &str = "CHAT_HISTORY_FILE";

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Where the chat history is stored (defaults to the data directory)
    #[serde(default)]
    pub history_file: Option<PathBuf>,
    /// Gemini model used for replies
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the Generative Language API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Seconds before a responder call is abandoned
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Temperature parameter for text generation (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum number of tokens in one reply
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            history_file: None,
            model: default_model(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl AppSettings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.max_output_tokens = self.max_output_tokens.clamp(1, 65536);
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 600);

        if self.model.trim().is_empty() {
            self.model = default_model();
        }

        if self.api_base_url.trim().is_empty() {
            self.api_base_url = default_api_base_url();
        }
        while self.api_base_url.ends_with('/') {
            self.api_base_url.pop();
        }
    }

    /// Resolve the history file location.
    ///
    /// `CHAT_HISTORY_FILE` wins over the configured path, which wins over the
    /// data directory. Falls back to the working directory when no data
    /// directory is available.
    pub fn history_path(&self) -> PathBuf {
        if let Some(path) = std::env::var_os(HISTORY_FILE_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }

        if let Some(path) = &self.history_file {
            return path.clone();
        }

        match get_data_dir() {
            Ok(dir) => dir.join(HISTORY_FILE_NAME),
            Err(e) => {
                tracing::warn!("{}, storing chat history in the working directory", e);
                PathBuf::from(HISTORY_FILE_NAME)
            }
        }
    }
}

/// Get the settings file path
fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from disk
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings() -> AppSettings {
    match get_settings_path().and_then(|path| load_settings_from(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            AppSettings::default()
        }
    }
}

/// Settings loading with error propagation
pub fn load_settings_from(path: &Path) -> Result<AppSettings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found, using defaults");
        return Ok(AppSettings::default());
    }

    let json = fs::read_to_string(path)?;
    let mut settings: AppSettings = serde_json::from_str(&json)?;
    settings.validate();

    tracing::debug!("Loaded settings from disk");
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) -> Result<(), StorageError> {
    save_settings_to(settings, &get_settings_path()?)
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;

    tracing::debug!("Saved settings to disk");
    Ok(())
}
