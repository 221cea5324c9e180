//! Evaluation runs: reproducible configs plus the generate / pairwise flows
//! the CLI drives.
//!
//! Every run writes its resolved config to `config.json` next to its outputs;
//! loading that file back reproduces the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::dataset::{ChatDataset, DatasetError, JsonlChatDataset, JsonlChatOptions};
use crate::diagnostics::DiagnosticSink;
use crate::gateway::{DispatchConfig, GenerationError, GenerationParams};
use crate::generation::{generate_chat_responses, GenerationRecord};
use crate::judge::{ChatLlmPairwiseJudge, JudgeError, ModelItem, PairwiseJudge, Winner};
use crate::language_model::{LanguageModel, DEFAULT_OPENAI_MODEL};
use crate::prompts::{preset_by_slug, DEFAULT_PRESET};
use crate::results::{
    read_jsonl, save_json, write_jsonl, ResultsError, CONFIG_FILE_NAME, JUDGEMENTS_FILE_NAME,
    OUTPUTS_FILE_NAME,
};
use crate::template::{Jinja2PromptTemplate, PromptTemplate, TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{} already exists; pass --force to overwrite", .0.display())]
    SaveDirNotEmpty(PathBuf),
    #[error("invalid run config: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Results(#[from] ResultsError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

// =============================================================================
// Config types
// =============================================================================

/// Identifies one execution of a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub harness_version: String,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of [`DispatchConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_num_trials: u32,
    pub first_wait_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let config = DispatchConfig::default();
        Self {
            max_num_trials: config.max_num_trials,
            first_wait_secs: config.first_wait_time.as_secs(),
        }
    }
}

impl RetrySettings {
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_num_trials: self.max_num_trials,
            first_wait_time: Duration::from_secs(self.first_wait_secs),
        }
    }
}

fn default_references_key() -> String {
    JsonlChatOptions::default().references_key
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRunConfig {
    pub dataset: PathBuf,
    #[serde(default = "default_references_key")]
    pub references_key: String,
    #[serde(default)]
    pub data_range: Option<(usize, usize)>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub retry: RetrySettings,
    pub save_dir: PathBuf,
    #[serde(default)]
    pub metadata: RunMetadata,
}

impl GenerateRunConfig {
    pub fn new(dataset: impl Into<PathBuf>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            references_key: default_references_key(),
            data_range: None,
            incremental: false,
            model: default_model(),
            params: GenerationParams::default(),
            retry: RetrySettings::default(),
            save_dir: save_dir.into(),
            metadata: RunMetadata::new(),
        }
    }

    pub fn dataset_options(&self) -> JsonlChatOptions {
        JsonlChatOptions {
            references_key: self.references_key.clone(),
            data_range: self.data_range,
            require_incremental_response: self.incremental,
        }
    }
}

/// A model's outputs file, labelled for the judgement records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedOutputs {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeSpec {
    /// Preset slug or path to a Jinja2 template file.
    pub template: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the preset's system message when set.
    #[serde(default)]
    pub system_message: Option<String>,
    #[serde(default)]
    pub params: GenerationParams,
}

impl Default for JudgeSpec {
    fn default() -> Self {
        Self {
            template: DEFAULT_PRESET.slug.to_string(),
            model: default_model(),
            system_message: None,
            params: GenerationParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseRunConfig {
    pub lm_outputs: Vec<NamedOutputs>,
    #[serde(default)]
    pub judge: JudgeSpec,
    #[serde(default)]
    pub retry: RetrySettings,
    pub save_dir: PathBuf,
    #[serde(default)]
    pub metadata: RunMetadata,
}

impl PairwiseRunConfig {
    pub fn new(lm_outputs: Vec<NamedOutputs>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            lm_outputs,
            judge: JudgeSpec::default(),
            retry: RetrySettings::default(),
            save_dir: save_dir.into(),
            metadata: RunMetadata::new(),
        }
    }

    /// Checks that need no files or model, so callers can fail early.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.lm_outputs.len() < 2 {
            return Err(RunError::InvalidConfig(
                "pairwise comparison needs at least two model outputs".to_string(),
            ));
        }
        Ok(())
    }
}

/// One line of `judgements.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseRecord {
    pub model1: String,
    pub model2: String,
    pub item_index: usize,
    pub model1_item: ModelItem,
    pub model2_item: ModelItem,
    pub winner: Winner,
    pub rationale: String,
}

// =============================================================================
// Runs
// =============================================================================

/// Create `save_dir`, refusing to reuse one that already holds a run config.
pub fn prepare_save_dir(save_dir: &Path, force: bool) -> Result<(), RunError> {
    let config_path = save_dir.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        return Err(RunError::SaveDirNotEmpty(config_path));
    }
    std::fs::create_dir_all(save_dir)?;
    Ok(())
}

/// Generate outputs for the configured dataset and save them with the config.
pub async fn run_generate(
    config: &GenerateRunConfig,
    model: &dyn LanguageModel,
    force: bool,
) -> Result<Vec<GenerationRecord>, RunError> {
    prepare_save_dir(&config.save_dir, force)?;

    let dataset = JsonlChatDataset::from_path(&config.dataset, &config.dataset_options())?;
    info!(
        instances = dataset.len(),
        model = model.model_name(),
        incremental = config.incremental,
        "Generating chat responses"
    );

    let records = generate_chat_responses(model, &dataset, &config.params).await?;

    write_jsonl(config.save_dir.join(OUTPUTS_FILE_NAME), &records)?;
    save_json(config.save_dir.join(CONFIG_FILE_NAME), config)?;
    Ok(records)
}

/// Resolve the judge template and system message from a [`JudgeSpec`].
pub fn build_llm_judge(
    spec: &JudgeSpec,
    language_model: Arc<dyn LanguageModel>,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> Result<ChatLlmPairwiseJudge, RunError> {
    let (template, preset_system) = match preset_by_slug(&spec.template) {
        Some(preset) => (preset.prompt_template()?, preset.system),
        None => (Jinja2PromptTemplate::from_path(&spec.template)?, None),
    };
    let template: Arc<dyn PromptTemplate> = Arc::new(template);

    let mut judge = ChatLlmPairwiseJudge::new(language_model, template)
        .with_params(spec.params.clone())
        .with_diagnostics(diagnostics);
    if let Some(system) = spec.system_message.as_deref().or(preset_system) {
        judge = judge.with_system_message(system);
    }
    Ok(judge)
}

/// Judge every pair of models (i < j in config order) item by item.
pub async fn run_pairwise(
    config: &PairwiseRunConfig,
    judge: &dyn PairwiseJudge,
    force: bool,
) -> Result<Vec<PairwiseRecord>, RunError> {
    config.validate()?;
    prepare_save_dir(&config.save_dir, force)?;

    let mut outputs: Vec<Vec<ModelItem>> = Vec::with_capacity(config.lm_outputs.len());
    for named in &config.lm_outputs {
        outputs.push(read_jsonl(&named.path)?);
    }
    let num_items = outputs[0].len();
    if let Some(bad) = config
        .lm_outputs
        .iter()
        .zip(&outputs)
        .find(|(_, items)| items.len() != num_items)
    {
        return Err(RunError::InvalidConfig(format!(
            "{} has {} items, expected {num_items}",
            bad.0.name,
            bad.1.len()
        )));
    }

    let mut labels = Vec::new();
    let mut batch = Vec::new();
    for i in 0..outputs.len() {
        for j in (i + 1)..outputs.len() {
            for k in 0..num_items {
                labels.push((i, j, k));
                batch.push((outputs[i][k].clone(), outputs[j][k].clone()));
            }
        }
    }
    info!(pairs = batch.len(), "Judging model outputs pairwise");

    let judgements = judge.batch_judge(&batch).await?;

    let records: Vec<PairwiseRecord> = labels
        .into_iter()
        .zip(batch)
        .zip(judgements)
        .map(|(((i, j, k), (model1_item, model2_item)), judgement)| PairwiseRecord {
            model1: config.lm_outputs[i].name.clone(),
            model2: config.lm_outputs[j].name.clone(),
            item_index: k,
            model1_item,
            model2_item,
            winner: judgement.winner,
            rationale: judgement.rationale,
        })
        .collect();

    write_jsonl(config.save_dir.join(JUDGEMENTS_FILE_NAME), &records)?;
    save_json(config.save_dir.join(CONFIG_FILE_NAME), config)?;
    Ok(records)
}
