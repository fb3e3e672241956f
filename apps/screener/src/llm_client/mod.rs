/// LLM Client: the only place the screener talks to the Anthropic API.
///
/// Scoring code never builds HTTP requests itself; it goes through
/// `LlmClient` (via the `ScreeningLlm` trait) so retries, model choice and
/// output parsing stay in one spot.
///
/// Model: claude-sonnet-4-5, fixed so scores stay comparable across batches.
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;
mod wire;

use wire::{error_message, LlmResponse, MessagesRequest};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
/// Summaries and opinions are a few paragraphs; scores are tiny JSON objects.
const MAX_TOKENS: u32 = 2048;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM returned a non-finite score")]
    InvalidScore,
}

/// Retry schedule for transient failures (transport errors, 429, 5xx).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before `attempt` (0-based): none, then base, 2×base, 4×base…
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => self.base_delay * 2u32.saturating_pow(n - 1),
        }
    }

    pub fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

enum AttemptError {
    Transient(LlmError),
    Fatal(LlmError),
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key,
            retry: RetryPolicy::default(),
        })
    }

    /// One Messages API round trip, retried per `RetryPolicy`.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request = MessagesRequest::single_turn(MODEL, MAX_TOKENS, system, prompt);
        let mut last_error = None;

        for attempt in 0..self.retry.attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                warn!(attempt, delay_ms = delay.as_millis() as u64, "Retrying LLM call");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(LlmError::Api { status: 429, .. }) | None => LlmError::RateLimited {
                retries: self.retry.attempts,
            },
            Some(e) => e,
        })
    }

    async fn attempt(&self, request: &MessagesRequest<'_>) -> Result<LlmResponse, AttemptError> {
        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response.text().await.unwrap_or_default());
            let error = LlmError::Api {
                status: status.as_u16(),
                message,
            };
            return Err(if RetryPolicy::is_retryable(status) {
                warn!(status = status.as_u16(), error = %error, "Transient LLM failure");
                AttemptError::Transient(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        let parsed: LlmResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "LLM call succeeded"
        );
        if parsed.was_truncated() {
            warn!("LLM response hit max_tokens and was truncated");
        }
        Ok(parsed)
    }

    /// Trimmed text of the reply; an empty reply is an error.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::EmptyContent);
        }
        Ok(text.to_string())
    }

    /// Deserializes the reply as JSON. The prompt must ask for a JSON object.
    pub async fn call_json<T: DeserializeOwned>(&self, prompt: &str, system: &str) -> Result<T, LlmError> {
        let text = self.call_text(prompt, system).await?;
        Ok(serde_json::from_str(extract_json(&text))?)
    }
}

/// Finds the JSON object in a reply, tolerating code fences and stray prose
/// around it.
fn extract_json(text: &str) -> &str {
    let text = text.trim();
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
