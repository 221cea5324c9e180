//! Chat datasets: the instances fed to a chat model under evaluation.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::gateway::Message;

/// Key that `extra_info` may never contain.
pub const RESERVED_EXTRA_INFO_KEY: &str = "messages";

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("extra_info cannot contain a key named 'messages'; it would conflict with the messages field")]
    ReservedExtraInfoKey,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: {message}")]
    InvalidRecord { line: usize, message: String },
    #[error("invalid data range {start}..{end} for {len} instances")]
    InvalidRange { start: usize, end: usize, len: usize },
}

// =============================================================================
// Chat instance
// =============================================================================

/// One evaluation unit: a conversation prefix, acceptable reference answers,
/// and metadata passed along to metrics and judges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatInstance {
    messages: Vec<Message>,
    references: Vec<String>,
    extra_info: Map<String, Value>,
}

impl ChatInstance {
    pub fn new(
        messages: Vec<Message>,
        references: Vec<String>,
        extra_info: Map<String, Value>,
    ) -> Result<Self, DatasetError> {
        if extra_info.contains_key(RESERVED_EXTRA_INFO_KEY) {
            return Err(DatasetError::ReservedExtraInfoKey);
        }
        Ok(Self {
            messages,
            references,
            extra_info,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn extra_info(&self) -> &Map<String, Value> {
        &self.extra_info
    }
}

// =============================================================================
// Dataset trait
// =============================================================================

/// A dataset holding chat instances.
pub trait ChatDataset: Send + Sync {
    /// Number of chat instances.
    fn len(&self) -> usize;

    /// The `index`-th chat instance.
    fn get(&self, index: usize) -> Option<&ChatInstance>;

    /// If true, the conversation holds several user turns and the model must
    /// answer each of them in turn. Otherwise the model only continues from
    /// the last user message.
    fn require_incremental_response(&self) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &ChatInstance> + '_> {
        Box::new((0..self.len()).filter_map(move |i| self.get(i)))
    }
}

// =============================================================================
// JSON Lines dataset
// =============================================================================

/// Loading options for [`JsonlChatDataset`].
#[derive(Debug, Clone)]
pub struct JsonlChatOptions {
    /// Field holding the reference answer(s): a string or an array of strings.
    pub references_key: String,
    /// Keep only records `start..end` (after skipping blank lines).
    pub data_range: Option<(usize, usize)>,
    pub require_incremental_response: bool,
}

impl Default for JsonlChatOptions {
    fn default() -> Self {
        Self {
            references_key: "references".to_string(),
            data_range: None,
            require_incremental_response: false,
        }
    }
}

/// Chat dataset read from a JSON Lines file.
///
/// Each line is an object with a `messages` array; the references field is
/// optional and every other field lands in `extra_info`.
#[derive(Debug, Clone, Default)]
pub struct JsonlChatDataset {
    instances: Vec<ChatInstance>,
    require_incremental_response: bool,
}

impl JsonlChatDataset {
    pub fn from_path(
        path: impl AsRef<Path>,
        options: &JsonlChatOptions,
    ) -> Result<Self, DatasetError> {
        let raw = fs::read_to_string(path)?;
        Self::from_jsonl_str(&raw, options)
    }

    pub fn from_jsonl_str(raw: &str, options: &JsonlChatOptions) -> Result<Self, DatasetError> {
        let mut instances = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let record: Map<String, Value> = serde_json::from_str(line)
                .map_err(|source| DatasetError::Json {
                    line: line_no,
                    source,
                })?;
            instances.push(parse_record(record, &options.references_key, line_no)?);
        }

        if let Some((start, end)) = options.data_range {
            if start > end || end > instances.len() {
                return Err(DatasetError::InvalidRange {
                    start,
                    end,
                    len: instances.len(),
                });
            }
            let kept: Vec<ChatInstance> = instances.drain(start..end).collect();
            instances = kept;
        }

        Ok(Self::from_instances(
            instances,
            options.require_incremental_response,
        ))
    }

    pub fn from_instances(instances: Vec<ChatInstance>, require_incremental_response: bool) -> Self {
        Self {
            instances,
            require_incremental_response,
        }
    }
}

impl ChatDataset for JsonlChatDataset {
    fn len(&self) -> usize {
        self.instances.len()
    }

    fn get(&self, index: usize) -> Option<&ChatInstance> {
        self.instances.get(index)
    }

    fn require_incremental_response(&self) -> bool {
        self.require_incremental_response
    }
}

fn parse_record(
    mut record: Map<String, Value>,
    references_key: &str,
    line: usize,
) -> Result<ChatInstance, DatasetError> {
    let messages = record
        .remove("messages")
        .ok_or_else(|| DatasetError::InvalidRecord {
            line,
            message: "missing 'messages'".to_string(),
        })?;
    let messages: Vec<Message> =
        serde_json::from_value(messages).map_err(|source| DatasetError::Json { line, source })?;

    let references = match record.remove(references_key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(DatasetError::InvalidRecord {
                    line,
                    message: format!("reference must be a string, got {other}"),
                }),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(DatasetError::InvalidRecord {
                line,
                message: format!("'{references_key}' must be a string or an array, got {other}"),
            })
        }
    };

    ChatInstance::new(messages, references, record)
}
