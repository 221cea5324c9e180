//! Produce model outputs for every instance of a chat dataset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dataset::{ChatDataset, ChatInstance};
use crate::gateway::{GenerationError, GenerationParams, Message, Role};
use crate::language_model::LanguageModel;

/// One line of `outputs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// The model's final reply.
    pub lm_output: String,
    /// Conversation sent to the model for `lm_output`. In incremental mode
    /// earlier assistant turns are the model's own replies.
    pub messages: Vec<Message>,
    pub references: Vec<String>,
    #[serde(default)]
    pub extra_info: Map<String, Value>,
}

impl GenerationRecord {
    fn new(instance: &ChatInstance, messages: Vec<Message>, lm_output: String) -> Self {
        Self {
            lm_output,
            messages,
            references: instance.references().to_vec(),
            extra_info: instance.extra_info().clone(),
        }
    }
}

/// Generate one reply per instance, in dataset order.
///
/// Datasets that require incremental responses are answered turn by turn;
/// every round is a single batch over all instances that still have a user
/// turn left.
pub async fn generate_chat_responses(
    model: &dyn LanguageModel,
    dataset: &dyn ChatDataset,
    params: &GenerationParams,
) -> Result<Vec<GenerationRecord>, GenerationError> {
    let instances: Vec<&ChatInstance> = dataset.iter().collect();
    if dataset.require_incremental_response() {
        return generate_incrementally(model, &instances, params).await;
    }

    let messages_list: Vec<Vec<Message>> = instances
        .iter()
        .map(|instance| instance.messages().to_vec())
        .collect();
    let outputs = model
        .batch_generate_chat_response(&messages_list, params.clone())
        .await?;

    Ok(instances
        .iter()
        .zip(messages_list)
        .zip(outputs)
        .map(|((instance, messages), output)| GenerationRecord::new(instance, messages, output))
        .collect())
}

async fn generate_incrementally(
    model: &dyn LanguageModel,
    instances: &[&ChatInstance],
    params: &GenerationParams,
) -> Result<Vec<GenerationRecord>, GenerationError> {
    let mut conversations: Vec<Vec<Message>> = vec![Vec::new(); instances.len()];
    let mut cursors = vec![0usize; instances.len()];
    // Prompt of each instance's final round, without the reply to it.
    let mut last_prompts: Vec<Vec<Message>> = vec![Vec::new(); instances.len()];
    let mut last_outputs = vec![String::new(); instances.len()];

    loop {
        let mut round_indices = Vec::new();
        let mut round_messages = Vec::new();

        for (i, instance) in instances.iter().enumerate() {
            if advance_to_next_user_turn(
                instance.messages(),
                &mut cursors[i],
                &mut conversations[i],
            ) {
                round_indices.push(i);
                round_messages.push(conversations[i].clone());
            }
        }

        if round_indices.is_empty() {
            break;
        }

        let outputs = model
            .batch_generate_chat_response(&round_messages, params.clone())
            .await?;
        for ((i, prompt), output) in round_indices.into_iter().zip(round_messages).zip(outputs) {
            conversations[i].push(Message::assistant(output.as_str()));
            last_prompts[i] = prompt;
            last_outputs[i] = output;
        }
    }

    Ok(instances
        .iter()
        .zip(last_prompts)
        .zip(last_outputs)
        .map(|((instance, messages), output)| GenerationRecord::new(instance, messages, output))
        .collect())
}

/// Copy messages into `conversation` up to and including the next user turn.
/// Scripted assistant turns are skipped; the model's replies replace them.
/// Returns false once no user turn is left.
fn advance_to_next_user_turn(
    source: &[Message],
    cursor: &mut usize,
    conversation: &mut Vec<Message>,
) -> bool {
    while let Some(message) = source.get(*cursor) {
        *cursor += 1;
        match message.role {
            Role::Assistant => continue,
            Role::System => conversation.push(message.clone()),
            Role::User => {
                conversation.push(message.clone());
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_skips_scripted_assistant_turns() {
        let source = vec![
            Message::system("sys"),
            Message::user("q1"),
            Message::assistant("scripted"),
            Message::user("q2"),
        ];
        let mut cursor = 0;
        let mut conversation = Vec::new();

        assert!(advance_to_next_user_turn(&source, &mut cursor, &mut conversation));
        assert_eq!(conversation, vec![Message::system("sys"), Message::user("q1")]);

        conversation.push(Message::assistant("generated"));
        assert!(advance_to_next_user_turn(&source, &mut cursor, &mut conversation));
        assert_eq!(conversation.last(), Some(&Message::user("q2")));
        assert_eq!(conversation.len(), 4);

        assert!(!advance_to_next_user_turn(&source, &mut cursor, &mut conversation));
    }
}
