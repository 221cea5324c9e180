//! Diagnostic events via the DiagnosticSink trait.
//!
//! The dispatcher and the judge report retries, completions and parse
//! problems through a sink handed to them at construction, instead of writing
//! to a process-wide logger:
//! - the CLI uses TracingSink (forwards to `tracing`)
//! - library callers can plug in their own sink
//! - tests use RecordingSink or NoopSink

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::gateway::FinishReason;

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A request hit an API error and will be retried after `wait`.
    Retry {
        /// Position of the request within its batch.
        request_index: usize,
        /// Zero-based index of the attempt that failed.
        attempt: u32,
        /// Short error code (see `ProviderError::code`).
        error_code: &'static str,
        /// Human readable error summary.
        error: String,
        /// Backoff before the next attempt.
        wait: Duration,
    },
    /// A request got its response. Token counts are 0 when not reported.
    Completion {
        request_index: usize,
        input_tokens: u32,
        output_tokens: u32,
        latency: Duration,
        finish_reason: FinishReason,
    },
    /// The judge stated a number outside {1, 2, 3}.
    InvalidJudgeValue { value: String, output: String },
    /// No verdict number could be extracted from the judge output.
    JudgeParseFailure { output: String },
}

impl Diagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::Retry { .. } => "retry",
            Diagnostic::Completion { .. } => "completion",
            Diagnostic::InvalidJudgeValue { .. } => "invalid_judge_value",
            Diagnostic::JudgeParseFailure { .. } => "judge_parse_failure",
        }
    }
}

/// Trait for receiving diagnostic events.
///
/// Recording must not fail or block for long: sinks are called from inside
/// request futures.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: Diagnostic);
}

/// Sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&self, _event: Diagnostic) {}
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: Diagnostic) {
        match event {
            Diagnostic::Retry {
                request_index,
                attempt,
                error_code,
                error,
                wait,
            } => {
                info!(
                    request_index,
                    attempt,
                    error_code,
                    error = %error,
                    wait_secs = wait.as_secs_f64(),
                    "API error received; waiting before retry"
                );
            }
            Diagnostic::Completion {
                request_index,
                input_tokens,
                output_tokens,
                latency,
                finish_reason,
            } => {
                debug!(
                    request_index,
                    input_tokens,
                    output_tokens,
                    latency_ms = latency.as_millis() as u64,
                    finish_reason = ?finish_reason,
                    "Chat completion received"
                );
            }
            Diagnostic::InvalidJudgeValue { value, output } => {
                warn!(value = %value, output = %output, "Invalid number extracted from judge output");
            }
            Diagnostic::JudgeParseFailure { output } => {
                warn!(output = %output, "Failed to extract the judgement from judge output");
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Completion events, in recording order.
    pub fn completions(&self) -> Vec<Diagnostic> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, Diagnostic::Completion { .. }))
            .collect()
    }

    /// Backoff waits of every recorded retry, in recording order.
    pub fn retry_waits(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Diagnostic::Retry { wait, .. } => Some(wait),
                _ => None,
            })
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, event: Diagnostic) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
