/// LLM Client — the single point of entry for all Anthropic API calls in Debrief.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All LLM interactions MUST go through this module.
///
/// The client makes exactly one HTTP attempt per call. Retry, backoff, and
/// admission control belong to the orchestrator — keeping them out of here
/// means the executor sees every failure and can classify it.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::evaluation::cleanup::clean_output;
use crate::evaluation::EvaluationRequest;
use crate::orchestrator::dispatch::EvaluationBackend;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model for low-latency tier requests (small output budget).
pub const HAIKU_MODEL: &str = "claude-3-haiku-20240307";
/// Model for slow-tier requests (large output budget).
pub const SONNET_MODEL: &str = "claude-3-5-sonnet-20241022";

/// How a failed call should be treated by the retry executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Explicit rate-limit signal (HTTP 429), may carry a retry-after hint.
    RateLimited,
    /// Capacity signal (HTTP 529).
    Overloaded,
    /// Per-attempt deadline exceeded.
    Timeout,
    /// Everything else — terminal, never retried.
    Other,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Other)
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("API call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LlmError::Api { status: 429, .. } => FailureKind::RateLimited,
            LlmError::Api { status: 529, .. } => FailureKind::Overloaded,
            LlmError::Timeout(_) => FailureKind::Timeout,
            _ => FailureKind::Other,
        }
    }

    /// Server-provided retry-after hint, if the failure carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// The single LLM client used by every evaluation request in Debrief.
/// Wraps the Anthropic Messages API; one HTTP attempt per `call`.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            // Transport timeout sits above the orchestrator's 60s per-attempt
            // deadline so the executor's timeout classification wins.
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a single call to the Messages API.
    /// Non-2xx responses surface as `LlmError::Api` with the numeric status
    /// and the retry-after header (when present) preserved for classification.
    pub async fn call(
        &self,
        model: &str,
        max_tokens: u32,
        prompt: &str,
    ) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model,
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);

            let body = response.text().await.unwrap_or_default();
            // Try to parse the structured error message
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
                retry_after,
            });
        }

        let llm_response: LlmResponse = response.json().await?;

        debug!(
            "LLM call succeeded: model={}, input_tokens={}, output_tokens={}",
            model, llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        Ok(llm_response)
    }
}

/// Production backend: tier-selected model, text extraction, output cleanup.
pub struct AnthropicBackend {
    llm: LlmClient,
}

impl AnthropicBackend {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl EvaluationBackend for AnthropicBackend {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<String, LlmError> {
        let model = if request.low_latency {
            HAIKU_MODEL
        } else {
            SONNET_MODEL
        };

        let response = self
            .llm
            .call(model, request.output_budget, &request.prompt_body)
            .await?;

        let text = response.text().ok_or(LlmError::EmptyContent)?;

        Ok(clean_output(text, request.content_anchor))
    }
}
