use crate::project::Example;
use crate::template::{PromptArgs, build_prompt};
use serde::{Deserialize, Serialize};

/// System message used when the caller supplies none.
pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are my unit testing assistant, you will help me write unit tests for the files I provide, your reply will only include the unit tests without any additional information, starting your response with ``` and ending it with ``` directly will help me understand your response better.";

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the whole conversation
    System,
    /// Prompt sent by the user
    User,
    /// Reply from the model
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl Message {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Expands few-shot examples into alternating user/assistant messages.
///
/// Each user message is the prompt `base` would produce for the example's
/// code and file name; the assistant reply is the example's tests verbatim.
/// Yields `2 * examples.len()` messages, or none when `examples` is `None`.
#[must_use]
pub fn expand_examples(base: &PromptArgs<'_>, examples: Option<&[Example]>) -> Vec<Message> {
    let Some(examples) = examples else {
        return Vec::new();
    };

    examples
        .iter()
        .flat_map(|example| {
            let prompt = build_prompt(&base.for_file(&example.code, &example.file_name));
            [Message::user(prompt), Message::assistant(example.tests.clone())]
        })
        .collect()
}

/// Backend-agnostic chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// System message, examples, then the prompt
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// Assembles the message sequence: one system message, every example
    /// message in order, then a single user message carrying `prompt`.
    #[must_use]
    pub fn build(
        model: impl Into<String>,
        system_message: Option<&str>,
        prompt: impl Into<String>,
        example_messages: &[Message],
    ) -> Self {
        let mut messages = Vec::with_capacity(example_messages.len() + 2);
        messages.push(Message::system(
            system_message.unwrap_or(DEFAULT_SYSTEM_MESSAGE),
        ));
        messages.extend_from_slice(example_messages);
        messages.push(Message::user(prompt));

        Self {
            model: model.into(),
            messages,
        }
    }
}
