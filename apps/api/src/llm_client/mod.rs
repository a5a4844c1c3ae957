//! Anthropic Messages API client used for entity tagging.
//!
//! Every model call in the service goes through [`LlmClient::call_json`].
//! A call is bounded by its budget: attempts and the backoff between them
//! all finish before the deadline or the call fails. Dropping the returned
//! future abandons the request.
use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod prompts;

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 2048;
const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BUDGET: Duration = Duration::from_secs(45);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM call exceeded its {}ms budget after {attempts} attempt(s)", .budget.as_millis())]
    BudgetExhausted { attempts: u32, budget: Duration },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM reply contains no JSON")]
    NoJson,
}

impl LlmError {
    /// Worth another attempt: overload, rate limiting and transport failures.
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Reply {
    content: Vec<Block>,
    usage: TokenUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl Reply {
    fn into_text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            Block::Text { text } if !text.trim().is_empty() => Some(text),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    api_url: String,
    api_key: String,
    budget: Duration,
    backoff: Duration,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_url: DEFAULT_API_URL.to_string(),
            api_key,
            budget: DEFAULT_BUDGET,
            backoff: DEFAULT_BACKOFF,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Wall-clock limit for one call, retries included.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// First retry delay; doubles on each further attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sends `prompt` and decodes the JSON value embedded in the reply.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.complete(prompt, system).await?;
        let json = json_span(&text).ok_or(LlmError::NoJson)?;
        Ok(serde_json::from_str(json)?)
    }

    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };
        let deadline = Instant::now() + self.budget;
        let exhausted = |attempts| LlmError::BudgetExhausted {
            attempts,
            budget: self.budget,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match tokio::time::timeout_at(deadline, self.send(&request)).await {
                Err(_) => return Err(exhausted(attempt)),
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if !e.is_transient() || attempt >= MAX_ATTEMPTS => return Err(e),
                Ok(Err(e)) => e,
            };

            let delay = self.backoff * 2u32.pow(attempt - 1);
            if Instant::now() + delay >= deadline {
                warn!(attempt, error = %error, "LLM call failed with no budget left to retry");
                return Err(exhausted(attempt));
            }
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "LLM call failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let reply: Reply = response.json().await?;
        debug!(
            input_tokens = reply.usage.input_tokens,
            output_tokens = reply.usage.output_tokens,
            "LLM call succeeded"
        );
        reply.into_text().ok_or(LlmError::EmptyContent)
    }
}

/// The outermost JSON object or array in `text`, skipping any prose or
/// code fence around it.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
