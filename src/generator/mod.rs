//! Story generation against an external generateContent-style API.
//!
//! The prompt is a deterministic template expansion; the requested size
//! tier is communicated to the model as a textual word-count band, not
//! enforced programmatically. Failures surface as a typed
//! [`GenerateError`] so callers can tell validation, transport and
//! upstream problems apart without string matching.

use crate::config::GeneratorConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Structured fields a caller supplies for one generation.
#[derive(Debug, Clone)]
pub struct StoryRequest {
    pub idea: String,
    pub genre: String,
    pub tone: String,
    /// Length tier, 1..=3. Validated at the gateway boundary.
    pub size: u8,
}

/// Word-count band communicated to the model for a size tier.
pub fn word_band(size: u8) -> Option<&'static str> {
    match size {
        1 => Some("150–200"),
        2 => Some("400–500"),
        3 => Some("700–900"),
        _ => None,
    }
}

/// Deterministic prompt template for one request.
pub fn build_prompt(req: &StoryRequest) -> String {
    format!(
        "Expand the following one-line idea into a detailed and engaging short story.\n\
         \n\
         Requirements:\n\
         - Genre: {genre}\n\
         - Tone: {tone}\n\
         - Size: {size}, where:\n\
         \x20  • 1 = Short (~150–200 words)\n\
         \x20  • 2 = Medium (~400–500 words)\n\
         \x20  • 3 = Long (~700–900 words)\n\
         \n\
         Idea: {idea}\n\
         \n\
         Make sure the story length strictly follows the chosen size value.\n",
        genre = req.genre,
        tone = req.tone,
        size = req.size,
        idea = req.idea,
    )
}

/// Typed failure of one generation call.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The provider answered with a non-success status.
    #[error("story provider returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    /// The request never completed (connect failure, timeout, bad body).
    #[error("story provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// A well-formed response carrying no usable text.
    #[error("story provider returned an empty response")]
    EmptyResponse,
}

/// The external text-generation capability.
#[async_trait]
pub trait StoryGenerator: Send + Sync {
    async fn generate(&self, req: &StoryRequest) -> Result<String, GenerateError>;
}

// ── Gemini wire format ───────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// reqwest-backed generator for Gemini-style `generateContent` endpoints.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .connect_timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.api_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl StoryGenerator for GeminiGenerator {
    async fn generate(&self, req: &StoryRequest) -> Result<String, GenerateError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(req),
                }],
            }],
        };

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        let text: String = parsed
            .candidates
            .iter()
            .flat_map(|c| c.content.iter())
            .flat_map(|c| c.parts.iter())
            .map(|p| p.text.as_str())
            .collect();
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(GenerateError::EmptyResponse);
        }
        Ok(text)
    }
}
