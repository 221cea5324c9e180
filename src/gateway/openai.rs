//! Adapter for OpenAI-compatible chat completion endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use super::error::{ErrorContext, ProviderError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// =============================================================================
// OPENAI ADAPTER
// =============================================================================

const PROVIDER: &str = "openai";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiAdapter {
    /// Create from API key against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, None)
    }

    /// Create from environment variables.
    ///
    /// Reads `OPENAI_API_KEY` (required), `OPENAI_BASE_URL`,
    /// `OPENAI_TIMEOUT_SECONDS` and `OPENAI_ORGANIZATION`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::config("OPENAI_API_KEY not set"))?;

        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let timeout = std::env::var("OPENAI_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        let organization = std::env::var("OPENAI_ORGANIZATION").ok();

        Self::with_config(api_key, base_url, timeout, organization)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        organization: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        if let Some(ref org) = organization {
            let value = HeaderValue::from_str(org)
                .map_err(|_| ProviderError::config("Invalid organization header"))?;
            headers.insert("OpenAI-Organization", value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<serde_json::Value>,
}

impl ApiError {
    fn code_string(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
    }
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for OpenAiAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.chat_url())
            .json(req)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout))?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout))?;

        if !status.is_success() {
            let mut ctx = ErrorContext::new().with_status(status.as_u16());
            if let Some(id) = &request_id {
                ctx = ctx.with_request_id(id);
            }

            let api_error = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error);
            let message = match &api_error {
                Some(error) => {
                    if let Some(code) = error.code_string() {
                        ctx = ctx.with_code(code);
                    }
                    error.message.clone().unwrap_or_default()
                }
                None => format!("HTTP {}", status.as_u16()),
            };

            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited {
                    message,
                    context: ctx,
                },
                code => ProviderError::Status {
                    provider: PROVIDER,
                    status: code,
                    message,
                    context: ctx,
                },
            });
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(PROVIDER, format!("Invalid JSON: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::invalid_response(
                PROVIDER,
                error.message.unwrap_or_default(),
            ));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER, "No choices in response"))?;

        // A null content (e.g. a pure tool call) reads as an empty generation.
        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| {
                (
                    u.prompt_tokens.unwrap_or(0),
                    u.completion_tokens.unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));

        Ok(ChatResponse {
            content,
            input_tokens,
            output_tokens,
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
