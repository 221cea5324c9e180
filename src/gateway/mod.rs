//! Chat gateway: provider adapters plus the retrying batch dispatcher.

pub mod error;
pub mod openai;
pub mod types;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio::time::sleep;

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};

pub use error::{ErrorContext, GenerationError, ProviderError};
pub use openai::{ChatProvider, OpenAiAdapter};
pub use types::*;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Attempts per request, including the first one.
    pub max_num_trials: u32,
    /// Backoff before the first retry; doubles on every further retry.
    pub first_wait_time: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_num_trials: 5,
            first_wait_time: Duration::from_secs(10),
        }
    }
}

/// Sends batches of chat requests concurrently, retrying each on API errors.
///
/// Requests in a batch never share state; the provider is shared read-only.
/// Results come back in input order. The first request that fails for good
/// fails the whole batch.
#[derive(Clone)]
pub struct BatchDispatcher {
    provider: Arc<dyn ChatProvider>,
    config: DispatchConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl BatchDispatcher {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self::with_config(provider, DispatchConfig::default(), Arc::new(TracingSink))
    }

    pub fn with_config(
        provider: Arc<dyn ChatProvider>,
        config: DispatchConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            provider,
            config,
            diagnostics,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Generate one response per message sequence, in input order.
    ///
    /// Parameters are validated before any request is sent.
    pub async fn batch_chat(
        &self,
        model: &str,
        messages_list: Vec<Vec<Message>>,
        params: GenerationParams,
    ) -> Result<Vec<String>, GenerationError> {
        let options = params.into_options()?;

        let tasks = messages_list
            .into_iter()
            .enumerate()
            .map(|(index, messages)| {
                let req = ChatRequest::new(model, messages).with_options(options.clone());
                async move {
                    let resp = self.chat(index, &req).await?;
                    Ok::<_, GenerationError>(resp.content)
                }
            });

        try_join_all(tasks).await
    }

    /// Send a single request with retries. `request_index` only labels diagnostics.
    ///
    /// A successful response is reported as a `Diagnostic::Completion` with
    /// its token usage, latency and finish reason.
    pub async fn chat(
        &self,
        request_index: usize,
        req: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let resp = retry_on_error(
            || self.provider.chat(req),
            &self.config,
            self.diagnostics.as_ref(),
            request_index,
        )
        .await?;

        self.diagnostics.record(Diagnostic::Completion {
            request_index,
            input_tokens: resp.input_tokens,
            output_tokens: resp.output_tokens,
            latency: resp.latency,
            finish_reason: resp.finish_reason.clone(),
        });
        Ok(resp)
    }
}

/// Run `call` until it succeeds, it fails with a non-API error, or
/// `config.max_num_trials` attempts have failed.
///
/// The wait after failed attempt `i` (zero-based) is `first_wait_time * 2^i`.
pub async fn retry_on_error<T, F, Fut>(
    mut call: F,
    config: &DispatchConfig,
    diagnostics: &dyn DiagnosticSink,
    request_index: usize,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_num_trials = config.max_num_trials.max(1);
    let mut attempt = 0u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_api_error() || attempt + 1 >= max_num_trials {
                    return Err(err);
                }

                let wait = backoff_delay(config.first_wait_time, attempt);
                diagnostics.record(Diagnostic::Retry {
                    request_index,
                    attempt,
                    error_code: err.code(),
                    error: err.to_string(),
                    wait,
                });
                sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
