//! Pairwise judges: decide which of two model outputs is better.

pub mod llm_judge;
pub mod types;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::gateway::GenerationError;
use crate::template::TemplateError;

pub use llm_judge::{parse_judge_output, ChatLlmPairwiseJudge};
pub use types::{Judgement, Winner};

/// One model's side of a comparison: its output plus whatever the prompt
/// template needs. The first item of each pair must carry `references`.
pub type ModelItem = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("pair {index}: model1 item has no 'references' entry")]
    MissingReferences { index: usize },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("expected {expected} judge outputs, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[async_trait]
pub trait PairwiseJudge: Send + Sync {
    /// Judge every pair; output order matches input order.
    async fn batch_judge(
        &self,
        batch_model_items: &[(ModelItem, ModelItem)],
    ) -> Result<Vec<Judgement>, JudgeError>;

    /// Judge a single pair through the batch path.
    async fn judge(
        &self,
        model1_item: &ModelItem,
        model2_item: &ModelItem,
    ) -> Result<Judgement, JudgeError> {
        let batch = [(model1_item.clone(), model2_item.clone())];
        let mut judgements = self.batch_judge(&batch).await?;
        if judgements.len() != 1 {
            return Err(JudgeError::LengthMismatch {
                expected: 1,
                actual: judgements.len(),
            });
        }
        Ok(judgements.remove(0))
    }
}
