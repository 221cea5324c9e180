//! Pairwise judging with a chat language model as the arbiter.
//!
//! The judge is asked to end its answer with 1 (model 1 wins), 2 (model 2
//! wins) or 3 (draw). The last integer in the output is taken as the verdict,
//! so numbers quoted while reasoning do not count.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::gateway::{GenerationParams, Message};
use crate::language_model::LanguageModel;
use crate::template::PromptTemplate;

use super::types::{Judgement, Winner};
use super::{JudgeError, ModelItem, PairwiseJudge};

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid integer regex"));
static DECIMAL_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d$").expect("Invalid decimal digit regex"));

// =============================================================================
// Output parsing
// =============================================================================

/// Map judge text to a verdict. Never fails: malformed output becomes a draw
/// whose rationale explains what went wrong and embeds the original text.
pub fn parse_judge_output(judge_output: &str, diagnostics: &dyn DiagnosticSink) -> Judgement {
    let Some(digits) = INTEGER
        .find_iter(judge_output)
        .last()
        .and_then(|m| ascii_digits(m.as_str()))
    else {
        diagnostics.record(Diagnostic::JudgeParseFailure {
            output: judge_output.to_string(),
        });
        return Judgement::new(Winner::Draw, format!("Parsing failure: {judge_output}"));
    };

    let winner = match digits.parse::<u64>() {
        Ok(1) => Some(Winner::Model1),
        Ok(2) => Some(Winner::Model2),
        Ok(3) => Some(Winner::Draw),
        _ => None,
    };

    match winner {
        Some(winner) => Judgement::new(winner, judge_output),
        None => {
            let value = canonical_integer(&digits);
            diagnostics.record(Diagnostic::InvalidJudgeValue {
                value: value.clone(),
                output: judge_output.to_string(),
            });
            Judgement::new(
                Winner::Draw,
                format!("Invalid judge '{value}': {judge_output}"),
            )
        }
    }
}

/// Rewrite a run of decimal digits as ASCII. `\d` matches every Unicode
/// decimal digit (Nd), not only `0-9`.
fn ascii_digits(matched: &str) -> Option<String> {
    matched
        .chars()
        .map(|c| digit_value(c).and_then(|d| char::from_digit(d, 10)))
        .collect()
}

/// Numeric value of a Unicode decimal digit.
///
/// Nd digits are assigned in contiguous runs of ten ordered 0 through 9, and
/// adjacent runs only ever abut whole, so the value is the offset from the
/// start of the surrounding block of digits, modulo ten.
fn digit_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut start = c as u32;
    while let Some(prev) = start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        start -= 1;
    }
    Some((c as u32 - start) % 10)
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DECIMAL_DIGIT.is_match(c.encode_utf8(&mut buf))
}

/// Integer text without leading zeros, valid for values beyond `u64`.
fn canonical_integer(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// Judge
// =============================================================================

/// Pairwise judge that renders each pair through a prompt template and asks a
/// chat model for the verdict.
pub struct ChatLlmPairwiseJudge {
    language_model: Arc<dyn LanguageModel>,
    prompt_template: Arc<dyn PromptTemplate>,
    system_message: Option<String>,
    params: GenerationParams,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ChatLlmPairwiseJudge {
    pub fn new(
        language_model: Arc<dyn LanguageModel>,
        prompt_template: Arc<dyn PromptTemplate>,
    ) -> Self {
        Self {
            language_model,
            prompt_template,
            system_message: None,
            params: GenerationParams::default(),
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// System message placed before the judge prompt. Empty strings are ignored.
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// Generation parameters for the judge calls.
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn build_messages(
        &self,
        index: usize,
        model1_item: &ModelItem,
        model2_item: &ModelItem,
    ) -> Result<Vec<Message>, JudgeError> {
        let references = model1_item
            .get("references")
            .ok_or(JudgeError::MissingReferences { index })?;
        let prompt_inputs = json!({
            "model1_item": model1_item,
            "model2_item": model2_item,
            "references": references,
        });
        let judge_input = self.prompt_template.embed_input(&prompt_inputs)?;

        let mut messages = vec![Message::user(judge_input)];
        if let Some(system) = self.system_message.as_deref().filter(|s| !s.is_empty()) {
            messages.insert(0, Message::system(system));
        }
        Ok(messages)
    }
}

#[async_trait]
impl PairwiseJudge for ChatLlmPairwiseJudge {
    async fn batch_judge(
        &self,
        batch_model_items: &[(ModelItem, ModelItem)],
    ) -> Result<Vec<Judgement>, JudgeError> {
        if batch_model_items.is_empty() {
            return Ok(Vec::new());
        }

        let messages_list = batch_model_items
            .iter()
            .enumerate()
            .map(|(index, (model1_item, model2_item))| {
                self.build_messages(index, model1_item, model2_item)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let judge_outputs = self
            .language_model
            .batch_generate_chat_response(&messages_list, self.params.clone())
            .await?;

        if judge_outputs.len() != batch_model_items.len() {
            return Err(JudgeError::LengthMismatch {
                expected: batch_model_items.len(),
                actual: judge_outputs.len(),
            });
        }

        Ok(judge_outputs
            .iter()
            .map(|output| parse_judge_output(output, self.diagnostics.as_ref()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    fn parse(text: &str) -> (Judgement, Vec<Diagnostic>) {
        let sink = RecordingSink::new();
        let judgement = parse_judge_output(text, &sink);
        (judgement, sink.events())
    }

    #[test]
    fn test_parse_model2() {
        let text = "Both are fine, but the winner is 2";
        let (judgement, events) = parse(text);
        assert_eq!(judgement, Judgement::new(Winner::Model2, text));
        assert!(events.is_empty());
    }

    #[test]
    fn test_last_integer_wins() {
        let text = "score: 5 out of 5, final: 1";
        let (judgement, _) = parse(text);
        assert_eq!(judgement, Judgement::new(Winner::Model1, text));
    }

    #[test]
    fn test_three_is_draw_with_original_rationale() {
        let (judgement, events) = parse("They are equally good.\n3");
        assert_eq!(judgement.winner, Winner::Draw);
        assert_eq!(judgement.rationale, "They are equally good.\n3");
        assert!(events.is_empty());
    }

    #[test]
    fn test_out_of_range_value_is_invalid_draw() {
        let (judgement, events) = parse("4");
        assert_eq!(judgement, Judgement::new(Winner::Draw, "Invalid judge '4': 4"));
        assert_eq!(
            events,
            vec![Diagnostic::InvalidJudgeValue {
                value: "4".into(),
                output: "4".into()
            }]
        );
    }

    #[test]
    fn test_no_number_is_parse_failure() {
        let (judgement, events) = parse("no numbers here");
        assert_eq!(
            judgement,
            Judgement::new(Winner::Draw, "Parsing failure: no numbers here")
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "judge_parse_failure");
    }

    #[test]
    fn test_leading_zeros_are_dropped() {
        let (judgement, _) = parse("verdict: 02");
        assert_eq!(judgement.winner, Winner::Model2);

        let (judgement, _) = parse("verdict: 007");
        assert_eq!(judgement.rationale, "Invalid judge '7': verdict: 007");
    }

    #[test]
    fn test_huge_number_is_invalid_not_failure() {
        let text = "answer 123456789012345678901234567890";
        let (judgement, _) = parse(text);
        assert_eq!(
            judgement.rationale,
            format!("Invalid judge '123456789012345678901234567890': {text}")
        );
    }

    #[test]
    fn test_full_width_digits() {
        let (judgement, _) = parse("勝者は２です");
        assert_eq!(judgement.winner, Winner::Model2);
    }

    #[test]
    fn test_arabic_indic_digit() {
        let text = "الفائز هو ٢";
        let (judgement, events) = parse(text);
        assert_eq!(judgement, Judgement::new(Winner::Model2, text));
        assert!(events.is_empty());
    }

    #[test]
    fn test_other_script_digits_keep_their_value() {
        // Devanagari seven is out of range, not unparseable.
        let (judgement, _) = parse("निर्णय ७");
        assert_eq!(judgement.rationale, "Invalid judge '7': निर्णय ७");

        // Double-struck two sits in the third of five abutting digit runs.
        let (judgement, _) = parse("verdict \u{1D7DA}");
        assert_eq!(judgement.winner, Winner::Model2);
    }

    #[test]
    fn test_digit_values_across_scripts() {
        assert_eq!(digit_value('7'), Some(7));
        assert_eq!(digit_value('\u{0660}'), Some(0));
        assert_eq!(digit_value('\u{0669}'), Some(9));
        assert_eq!(digit_value('\u{FF13}'), Some(3));
        assert_eq!(digit_value('\u{1D7CE}'), Some(0));
        assert_eq!(digit_value('\u{1D7FF}'), Some(9));
        assert_eq!(digit_value('x'), None);
        assert_eq!(digit_value('\u{00BD}'), None);
    }

    #[test]
    fn test_digits_inside_words_still_count() {
        let (judgement, _) = parse("Assistant1 is better than assistant2. Final verdict: [[1]]");
        assert_eq!(judgement.winner, Winner::Model1);
    }
}
