#![forbid(unsafe_code)]

//! # chat-eval-harness
//!
//! Evaluate chat language models by generating replies to a chat dataset and
//! asking an LLM judge to compare the outputs of two models side by side.
//!
//! The pieces:
//! - [`gateway`] sends chat completions concurrently, retrying transient API
//!   errors with exponential backoff while keeping results in input order.
//! - [`dataset`] holds chat instances (messages, references, extra fields).
//! - [`generation`] runs a [`LanguageModel`] over a dataset.
//! - [`judge`] renders pairs through a prompt template and reads the verdict
//!   from the last integer of the judge's reply.
//! - [`run`] ties these together into reproducible runs that save their
//!   config next to their outputs.

pub mod dataset;
pub mod diagnostics;
pub mod gateway;
pub mod generation;
pub mod judge;
pub mod language_model;
pub mod prompts;
pub mod results;
pub mod run;
pub mod template;

pub use dataset::{ChatDataset, ChatInstance, DatasetError, JsonlChatDataset, JsonlChatOptions};
pub use diagnostics::{Diagnostic, DiagnosticSink, NoopSink, RecordingSink, TracingSink};
pub use gateway::{
    BatchDispatcher, ChatProvider, DispatchConfig, GenerationError, GenerationParams, Message,
    OpenAiAdapter, ProviderError, Role,
};
pub use generation::{generate_chat_responses, GenerationRecord};
pub use judge::{
    parse_judge_output, ChatLlmPairwiseJudge, JudgeError, Judgement, ModelItem, PairwiseJudge,
    Winner,
};
pub use language_model::{LanguageModel, OpenAiChatModel, DEFAULT_OPENAI_MODEL};
pub use run::{
    build_llm_judge, run_generate, run_pairwise, GenerateRunConfig, JudgeSpec, NamedOutputs,
    PairwiseRecord, PairwiseRunConfig, RunError, RunMetadata,
};
pub use template::{Jinja2PromptTemplate, PromptTemplate, TemplateError};
