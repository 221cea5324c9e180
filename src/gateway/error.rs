//! Error types for the chat gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from provider errors for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// HTTP status code from the provider.
    pub http_status: Option<u16>,
    /// Provider-specific error code (e.g. "rate_limit_exceeded").
    pub provider_code: Option<String>,
    /// Request ID from provider (x-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur when calling a chat provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered 429.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        context: ErrorContext,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} returned HTTP {status}: {message}")]
    Status {
        provider: &'static str,
        status: u16,
        message: String,
        context: ErrorContext,
    },

    /// Request timed out.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Could not reach the provider.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider answered 2xx but the envelope was unusable.
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    /// Rejected locally before sending; permanent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Other HTTP/transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (missing API key, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify a transport failure from `reqwest`.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// Whether this is an API-level error, i.e. one the dispatcher retries.
    ///
    /// Everything the remote side or the transport surfaces counts, including
    /// non-2xx statuses. Errors raised locally before a request leaves the
    /// process do not.
    pub fn is_api_error(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Status { .. } => true,
            Self::Timeout(_) => true,
            Self::Connection(_) => true,
            Self::InvalidResponse { .. } => true,
            Self::Http(e) => !e.is_builder(),
            Self::InvalidRequest(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Status { .. } => "http_status",
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. } => Some(context),
            Self::Status { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

/// Errors from a batch generation call.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A normalized parameter and its raw option were both supplied.
    #[error(
        "both `{normalized}` and `{raw}` were given; `{normalized}` is normalized into `{raw}`, specify only one"
    )]
    ConflictingParameter {
        normalized: &'static str,
        raw: &'static str,
    },

    /// A passthrough option collides with a field the request owns.
    #[error("option `{0}` is set by the request itself and cannot be passed through")]
    ReservedOption(String),

    /// A request failed for good (non-API error, or retries exhausted).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}
