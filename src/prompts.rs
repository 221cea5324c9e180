//! Built-in judge prompt presets.
//!
//! Templates use Jinja2 syntax and see `model1_item`, `model2_item` and
//! `references`. Each asks the judge to finish with 1, 2 or 3.

use crate::template::{Jinja2PromptTemplate, TemplateError};

/// A named judge prompt.
#[derive(Debug, Clone, Copy)]
pub struct JudgePreset {
    pub slug: &'static str,
    pub system: Option<&'static str>,
    pub template: &'static str,
}

impl JudgePreset {
    pub fn prompt_template(&self) -> Result<Jinja2PromptTemplate, TemplateError> {
        Jinja2PromptTemplate::new(self.template)
    }
}

// =============================================================================
// Standard presets
// =============================================================================

pub const PAIRWISE_JUDGE: JudgePreset = JudgePreset {
    slug: "pairwise_judge",
    system: Some("You are a helpful and impartial assistant that evaluates the quality of AI assistant responses."),
    template: r#"Please act as an impartial judge and evaluate the quality of the responses provided by two AI assistants to the conversation below. Choose the assistant that follows the user's instructions and answers the user's question better. Consider helpfulness, relevance, accuracy, depth and level of detail. Do not let the order of the responses, their length, or the names of the assistants influence your decision. Be as objective as possible.

[Conversation]
{% for message in model1_item.messages %}{{ message.role }}: {{ message.content }}
{% endfor %}
[The Start of Assistant 1's Answer]
{{ model1_item.lm_output }}
[The End of Assistant 1's Answer]

[The Start of Assistant 2's Answer]
{{ model2_item.lm_output }}
[The End of Assistant 2's Answer]

First give a short explanation comparing the two answers. Then output your final verdict alone on the last line: "1" if assistant 1 is better, "2" if assistant 2 is better, or "3" for a tie."#,
};

pub const PAIRWISE_JUDGE_WITH_REFERENCE: JudgePreset = JudgePreset {
    slug: "pairwise_judge_with_reference",
    system: Some("You are a helpful and impartial assistant that evaluates the quality of AI assistant responses."),
    template: r#"Please act as an impartial judge and evaluate the quality of the responses provided by two AI assistants to the conversation below. Reference answers are provided; compare both assistants' answers with them, identify and correct any mistakes, and choose the assistant whose answer is more correct and helpful. Do not let the order of the responses, their length, or the names of the assistants influence your decision.

[Conversation]
{% for message in model1_item.messages %}{{ message.role }}: {{ message.content }}
{% endfor %}
[The Start of Reference Answer]
{% for reference in references %}{{ reference }}
{% endfor %}[The End of Reference Answer]

[The Start of Assistant 1's Answer]
{{ model1_item.lm_output }}
[The End of Assistant 1's Answer]

[The Start of Assistant 2's Answer]
{{ model2_item.lm_output }}
[The End of Assistant 2's Answer]

First give a short explanation comparing the two answers with the reference. Then output your final verdict alone on the last line: "1" if assistant 1 is better, "2" if assistant 2 is better, or "3" for a tie."#,
};

pub const PRESETS: &[JudgePreset] = &[PAIRWISE_JUDGE, PAIRWISE_JUDGE_WITH_REFERENCE];
pub const DEFAULT_PRESET: JudgePreset = PAIRWISE_JUDGE;

pub fn preset_by_slug(slug: &str) -> Option<JudgePreset> {
    PRESETS.iter().find(|p| p.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::PromptTemplate;
    use serde_json::json;

    #[test]
    fn presets_compile_and_render() {
        let inputs = json!({
            "model1_item": {
                "lm_output": "Paris",
                "messages": [{"role": "user", "content": "Capital of France?"}],
            },
            "model2_item": {"lm_output": "Lyon"},
            "references": ["Paris"],
        });
        for preset in PRESETS {
            let rendered = preset.prompt_template().unwrap().embed_input(&inputs).unwrap();
            assert!(rendered.contains("user: Capital of France?"), "{}", preset.slug);
            assert!(rendered.contains("Paris"));
            assert!(rendered.contains("Lyon"));
        }
    }

    #[test]
    fn reference_preset_lists_references() {
        let rendered = PAIRWISE_JUDGE_WITH_REFERENCE
            .prompt_template()
            .unwrap()
            .embed_input(&json!({
                "model1_item": {},
                "model2_item": {},
                "references": ["first ref", "second ref"],
            }))
            .unwrap();
        assert!(rendered.contains("first ref\nsecond ref\n[The End of Reference Answer]"));
    }

    #[test]
    fn preset_lookup() {
        assert!(preset_by_slug("pairwise_judge").is_some());
        assert!(preset_by_slug("nonexistent").is_none());
    }
}
