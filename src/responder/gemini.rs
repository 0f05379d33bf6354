//! Gemini responder
//!
//! Talks to the Generative Language `generateContent` endpoint. The REST API
//! is stateless, so the session keeps the turns exchanged since it started and
//! replays them with every request.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::responder::{Responder, ResponderError};
use crate::storage::settings::AppSettings;

/// Environment variables checked for the API key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

// ============================================================================
// Gemini API types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Pull the reply text out of a raw response body.
fn parse_reply(body: &str) -> Result<String, ResponderError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ResponderError::InvalidResponse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ResponderError::InvalidResponse(error.message));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ResponderError::EmptyResponse);
    }
    Ok(text)
}

// ============================================================================
// GeminiResponder
// ============================================================================

/// Conversation context for one Gemini chat
#[derive(Debug, Default)]
pub struct GeminiSession {
    history: Mutex<Vec<Content>>,
}

impl GeminiSession {
    /// Number of turns (user and model) recorded so far
    pub async fn turns(&self) -> usize {
        self.history.lock().await.len()
    }
}

#[derive(Clone)]
pub struct GeminiResponder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl fmt::Debug for GeminiResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiResponder")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiResponder {
    pub fn new(api_key: impl Into<String>, settings: &AppSettings) -> Result<Self, ResponderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ResponderError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, api_key, settings))
    }

    /// Build on an already configured HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        api_key: impl Into<String>,
        settings: &AppSettings,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    /// Read the API key from the environment.
    pub fn api_key_from_env() -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    type Session = GeminiSession;

    fn start_session(&self) -> GeminiSession {
        tracing::debug!("Starting Gemini session with model {}", self.model);
        GeminiSession::default()
    }

    async fn send(&self, session: &GeminiSession, text: &str) -> Result<String, ResponderError> {
        let user_turn = Content::new("user", text);
        // Snapshot only; overlapping sends do not wait on each other
        let mut contents = session.history.lock().await.clone();
        contents.push(user_turn.clone());

        let request = GenerateContentRequest {
            contents: &contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("Gemini API returned {}", status);
            return Err(ResponderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply = parse_reply(&body)?;

        let mut history = session.history.lock().await;
        history.push(user_turn);
        history.push(Content::new("model", reply.clone()));

        Ok(reply)
    }
}
