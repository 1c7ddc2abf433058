//! Optional LLM-backed extraction over an OpenAI-compatible chat endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{Candidate, Source};
use crate::memory::Priority;

pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const ENDPOINT_ENV: &str = "VIBEMEM_LLM_ENDPOINT";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RESPONSE_TOKENS: u32 = 2000;

/// Transcripts longer than this many characters are clipped.
const CLIP_THRESHOLD: usize = 50_000;
const CLIP_KEEP: usize = 25_000;
const CLIP_MARKER: &str = "\n...[truncated]...\n";

const PROMPT: &str = "Analyze this conversation and extract facts worth remembering for future \
sessions in this project. Focus on user corrections, project specifications (ports, endpoints, \
architecture), gotchas, coding conventions and platform-specific details.\n\n\
Return a JSON array of objects with keys \"category\" (one of arch, api, gotcha, error, cred, \
style, platform), \"content\" (a concise statement) and \"priority\" (critical, normal or low). \
Return only the JSON array.\n\nConversation:\n";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response had no choices")]
    EmptyResponse,

    #[error("malformed extraction payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    category: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    priority: Option<String>,
}

/// Client for one model on one endpoint.
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl LlmExtractor {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> LlmResult<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from the environment. `None` when no API key is set.
    pub fn from_env(model: &str) -> Option<Self> {
        let key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())?;
        let endpoint = std::env::var(ENDPOINT_ENV).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        match Self::new(endpoint, key, model) {
            Ok(extractor) => Some(extractor),
            Err(err) => {
                warn!(error = %err, "failed to build llm client");
                None
            }
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Candidates proposed by the model. Any failure is logged and yields
    /// nothing.
    pub async fn extract(&self, transcript: &str) -> Vec<Candidate> {
        match self.try_extract(transcript).await {
            Ok(candidates) => {
                debug!(model = %self.model, count = candidates.len(), "llm extraction finished");
                candidates
            }
            Err(err) => {
                warn!(model = %self.model, error = %err, "llm extraction failed");
                Vec::new()
            }
        }
    }

    async fn try_extract(&self, transcript: &str) -> LlmResult<Vec<Candidate>> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: format!("{PROMPT}{}", clip_transcript(transcript)),
            }],
            max_tokens: MAX_RESPONSE_TOKENS,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        parse_response(&content)
    }
}

/// Keep the head and tail of an oversized transcript.
pub fn clip_transcript(text: &str) -> String {
    let total = text.chars().count();
    if total <= CLIP_THRESHOLD {
        return text.to_string();
    }
    let head: String = text.chars().take(CLIP_KEEP).collect();
    let tail: String = text.chars().skip(total - CLIP_KEEP).collect();
    format!("{head}{CLIP_MARKER}{tail}")
}

/// Strip a surrounding markdown code fence, if any.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply into candidates. Entries without a category or
/// content are skipped; unknown priorities fall back to normal.
pub fn parse_response(text: &str) -> LlmResult<Vec<Candidate>> {
    let raw: Vec<RawCandidate> = serde_json::from_str(strip_fences(text))?;
    Ok(raw
        .into_iter()
        .filter(|r| !r.category.trim().is_empty() && !r.content.trim().is_empty())
        .map(|r| Candidate {
            category: r.category.trim().to_string(),
            content: r.content.trim().to_string(),
            priority: r
                .priority
                .and_then(|p| p.parse::<Priority>().ok())
                .unwrap_or_default(),
            source: Source::Llm,
        })
        .collect())
}
