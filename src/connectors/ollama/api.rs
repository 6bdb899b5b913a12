use serde::{Deserialize, Serialize};

use crate::chat::{Content, Role as ChatRole};
use crate::request::{Request, JSON_MIME_TYPE};
use crate::response::{Candidate, FinishReason, ProviderResult, Usage};

/* === IO === */

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    Assistant,
    User,
    System,
    Tool,
}

impl From<ChatRole> for Role {
    fn from(value: ChatRole) -> Self {
        match value {
            ChatRole::System => Role::System,
            ChatRole::User => Role::User,
            ChatRole::Model => Role::Assistant,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

// Structures to serialize /api/chat

#[derive(Serialize, Debug, Default)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Serialize, Debug)]
pub(super) struct ChatRequest<'m> {
    model: &'m str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    options: ModelOptions,
}

impl<'m> ChatRequest<'m> {
    pub(super) fn new(model: &'m str, request: &Request) -> ChatRequest<'m> {
        let mut messages = Vec::with_capacity(request.contents.len() + 1);

        if let Some(instruction) = request.system_instruction() {
            messages.push(ChatMessage {
                role: Role::System,
                content: instruction.to_string(),
            });
        }

        messages.extend(request.contents.iter().map(|content| ChatMessage {
            role: content.role.into(),
            content: content.text(),
        }));

        let config = request.config.clone().unwrap_or_default();

        // Ollama accepts either "json" or a JSON schema
        let format = match (config.response_schema, config.response_mime_type) {
            (Some(schema), _) => Some(schema),
            (None, Some(mime)) if mime == JSON_MIME_TYPE => Some(serde_json::Value::from("json")),
            _ => None,
        };

        ChatRequest {
            model,
            messages,
            stream: false,
            format,
            options: ModelOptions {
                temperature: config.temperature,
                top_p: config.top_p,
                num_predict: config.max_tokens,
                stop: config.stop_sequences,
            },
        }
    }
}

// Structures to deseralize /api/chat

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub(super) enum DoneReason {
    Stop,
    Length,
    Load,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
pub(super) struct ChatResponse {
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub done_reason: DoneReason,
}

impl From<ChatResponse> for ProviderResult {
    fn from(value: ChatResponse) -> Self {
        let (finish_reason, finish_message) = match value.done_reason {
            DoneReason::Stop => (FinishReason::Stop.to_string(), ""),
            DoneReason::Length => (
                FinishReason::MaxTokens.to_string(),
                "the response was cut off by the token limit",
            ),
            DoneReason::Load => (FinishReason::Other.to_string(), "the model was loaded but produced no response"),
            DoneReason::Unknown => (String::new(), ""),
        };

        let content = value
            .message
            .map(|m| m.content)
            .filter(|text| !text.is_empty())
            .map(Content::model);

        ProviderResult {
            candidates: vec![Candidate {
                content,
                finish_reason,
                finish_message: finish_message.to_string(),
                grounding: None,
            }],
            prompt_feedback: None,
            usage: Usage::new(
                value.prompt_eval_count.unwrap_or(0),
                value.eval_count.unwrap_or(0),
            ),
        }
    }
}
