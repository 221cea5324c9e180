//! Core types for the chat gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::error::GenerationError;

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// GENERATION PARAMETERS
// =============================================================================

/// Keys the request body owns; passthrough options may not set them.
const RESERVED_OPTION_KEYS: &[&str] = &["model", "messages"];

/// Generation parameters supplied by the caller.
///
/// `stop_sequences` and `max_new_tokens` are provider-neutral names. They are
/// normalized into the raw `stop` and `max_tokens` options of the chat API.
/// Everything in `options` is passed through to the request body untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_sequences<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop_sequences = Some(stops.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_new_tokens(mut self, max: u32) -> Self {
        self.max_new_tokens = Some(max);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Fold the normalized parameters into the raw option map.
    ///
    /// Fails if a normalized parameter and its raw equivalent are both set, or
    /// if an option tries to override a field the request body owns.
    pub fn into_options(self) -> Result<Map<String, Value>, GenerationError> {
        let mut options = self.options;

        if let Some(key) = RESERVED_OPTION_KEYS
            .iter()
            .find(|key| options.contains_key(**key))
        {
            return Err(GenerationError::ReservedOption((*key).to_string()));
        }

        if let Some(stops) = self.stop_sequences {
            if options.contains_key("stop") {
                return Err(GenerationError::ConflictingParameter {
                    normalized: "stop_sequences",
                    raw: "stop",
                });
            }
            options.insert("stop".to_string(), Value::from(stops));
        }

        if let Some(max) = self.max_new_tokens {
            if options.contains_key("max_tokens") {
                return Err(GenerationError::ConflictingParameter {
                    normalized: "max_new_tokens",
                    raw: "max_tokens",
                });
            }
            options.insert("max_tokens".to_string(), Value::from(max));
        }

        Ok(options)
    }
}

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// Request for a single chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier understood by the provider.
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Normalized generation options, flattened into the request body.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: Map::new(),
        }
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content of the first choice.
    pub content: String,
    /// Input tokens consumed, if reported.
    pub input_tokens: u32,
    /// Output tokens generated, if reported.
    pub output_tokens: u32,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// A response carrying only content. Handy for providers without usage data.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Stop,
        }
    }
}
