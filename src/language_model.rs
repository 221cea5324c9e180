//! Language model capability used by generation and judging.
//!
//! Callers depend on [`LanguageModel`] only; each provider gets its own
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::diagnostics::DiagnosticSink;
use crate::gateway::{
    BatchDispatcher, DispatchConfig, GenerationError, GenerationParams, Message, OpenAiAdapter,
    ProviderError,
};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Continue each text, treated as a single user message.
    async fn batch_complete_text(
        &self,
        texts: &[String],
        params: GenerationParams,
    ) -> Result<Vec<String>, GenerationError>;

    /// Reply to each conversation. Output order matches input order.
    async fn batch_generate_chat_response(
        &self,
        chat_messages_list: &[Vec<Message>],
        params: GenerationParams,
    ) -> Result<Vec<String>, GenerationError>;

    /// Model identifier, for run configs and logs.
    fn model_name(&self) -> &str;
}

/// Chat model served by an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiChatModel {
    model_name: String,
    dispatcher: BatchDispatcher,
}

impl OpenAiChatModel {
    pub fn new(model_name: impl Into<String>, dispatcher: BatchDispatcher) -> Self {
        Self {
            model_name: model_name.into(),
            dispatcher,
        }
    }

    /// Build the adapter from `OPENAI_*` environment variables.
    pub fn from_env(
        model_name: impl Into<String>,
        config: DispatchConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, ProviderError> {
        let adapter = OpenAiAdapter::from_env()?;
        let dispatcher = BatchDispatcher::with_config(Arc::new(adapter), config, diagnostics);
        Ok(Self::new(model_name, dispatcher))
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn batch_complete_text(
        &self,
        texts: &[String],
        params: GenerationParams,
    ) -> Result<Vec<String>, GenerationError> {
        let messages_list = texts
            .iter()
            .map(|text| vec![Message::user(text.as_str())])
            .collect();
        self.dispatcher
            .batch_chat(&self.model_name, messages_list, params)
            .await
    }

    async fn batch_generate_chat_response(
        &self,
        chat_messages_list: &[Vec<Message>],
        params: GenerationParams,
    ) -> Result<Vec<String>, GenerationError> {
        self.dispatcher
            .batch_chat(&self.model_name, chat_messages_list.to_vec(), params)
            .await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
