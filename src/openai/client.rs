use std::env;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, ChatRequest, ChatResponse, Message};

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
/// Per-call completion budget; the cost-bounding knob for generation.
const DEFAULT_MAX_TOKENS: u32 = 700;
const TEMPERATURE: f32 = 0.5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum OpenAiError {
    #[error("OPENAI_API_KEY not set")]
    ApiKeyNotSet,

    #[error("OpenAI rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("OpenAI error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Generation collaborator: one blocking chat completion per call.
/// Calls are paid, so implementations must not retry on their own; a
/// failure is surfaced to the caller to decide.
pub trait ChatModel {
    fn model(&self) -> &str;
    async fn complete(&self, messages: &[Message]) -> Result<String, OpenAiError>;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn from_env(http: Client) -> Result<Self, OpenAiError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| OpenAiError::ApiKeyNotSet)?;
        if api_key.trim().is_empty() {
            return Err(OpenAiError::ApiKeyNotSet);
        }
        let model = env::var("OPENAI_MODEL")
            .ok()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = env::var("OPENAI_BASE_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| API_BASE.to_string());
        Ok(Self {
            http,
            api_key: ApiKey(api_key.trim().to_string()),
            model,
            base_url,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ChatModel for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, OpenAiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("OpenAI rate limited");
            return Err(OpenAiError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if let Ok(body) = serde_json::from_str::<ChatResponse>(&text)
                && let Some(err) = &body.error
            {
                let classified = classify_api_error(status.as_u16(), err);
                warn!(error = %classified, "OpenAI API error");
                return Err(classified);
            }
            // Truncate on a char boundary: error bodies are arbitrary text.
            let snippet: String = text.chars().take(200).collect();
            warn!(status = %status, "OpenAI API error (no structured body)");
            return Err(OpenAiError::Api {
                code: status.as_u16(),
                message: format!("HTTP {status}: {snippet}"),
            });
        }

        let body: ChatResponse = response.json().await?;
        if let Some(err) = &body.error {
            let classified = classify_api_error(status.as_u16(), err);
            warn!(error = %classified, "OpenAI API error in 200 response");
            return Err(classified);
        }

        let content = body
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(String::from);

        debug!(model = %self.model, "chat completion finished");
        content.ok_or(OpenAiError::EmptyCompletion)
    }
}

fn classify_api_error(code: u16, err: &ApiError) -> OpenAiError {
    let message = err
        .message
        .clone()
        .unwrap_or_else(|| "Unknown error".to_string());
    match err.kind.as_deref() {
        Some("rate_limit_exceeded") | Some("insufficient_quota") => OpenAiError::RateLimited,
        _ => OpenAiError::Api { code, message },
    }
}
