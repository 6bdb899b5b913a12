use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{Content, Role as ChatRole};
use crate::request::{Request, JSON_MIME_TYPE};
use crate::response::{Candidate, FinishReason, ProviderResult, Usage as CanonicalUsage};

/// Body fields the connector sets itself; custom options cannot override them
const RESERVED_FIELDS: [&str; 3] = ["model", "messages", "stream"];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    System,
    User,
    Assistant,
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

#[derive(Serialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/* Structures to serialize /chat/completions */

#[derive(Serialize, Debug)]
struct ResponseFormat {
    #[serde(rename = "type")]
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_schema: Option<JsonSchema>,
}

#[derive(Serialize, Debug)]
struct JsonSchema {
    name: &'static str,
    schema: Value,
}

#[derive(Serialize, Debug)]
pub(super) struct ChatCompletionRequest<'r> {
    model: &'r str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
    #[serde(flatten)]
    extra: BTreeMap<&'r str, &'r Value>,
}

impl<'r> ChatCompletionRequest<'r> {
    /// `custom` holds additional body fields, e.g. `seed` or `user`
    pub(super) fn new(
        model: &'r str,
        request: &Request,
        custom: &'r BTreeMap<String, Value>,
    ) -> ChatCompletionRequest<'r> {
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

        let response_format = match (config.response_schema, config.response_mime_type) {
            (Some(schema), _) => Some(ResponseFormat {
                typ: "json_schema",
                json_schema: Some(JsonSchema {
                    name: "response",
                    schema,
                }),
            }),
            (None, Some(mime)) if mime == JSON_MIME_TYPE => Some(ResponseFormat {
                typ: "json_object",
                json_schema: None,
            }),
            _ => None,
        };

        let mut body = ChatCompletionRequest {
            model,
            messages,
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
            stop: config.stop_sequences,
            response_format,
            stream: false,
            extra: BTreeMap::new(),
        };

        // Settings on the request win over custom options of the same name
        body.extra = custom
            .iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()) && !body.sets(key))
            .map(|(key, value)| (key.as_str(), value))
            .collect();

        body
    }

    /// Whether the typed part of the body already serializes `field`
    fn sets(&self, field: &str) -> bool {
        match field {
            "temperature" => self.temperature.is_some(),
            "top_p" => self.top_p.is_some(),
            "max_tokens" => self.max_tokens.is_some(),
            "stop" => !self.stop.is_empty(),
            "response_format" => self.response_format.is_some(),
            _ => false,
        }
    }
}

/* Structures to deseralize /chat/completions */

#[derive(Deserialize, Debug, Default)]
pub(super) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    /// Set instead of `content` when the model declines to answer
    #[serde(default)]
    pub refusal: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(super) struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Deserialize, Debug)]
pub(super) struct ChatCompletion {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

fn finish_reason(reason: &str) -> String {
    let canonical = match reason {
        "" => return String::new(),
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        "content_filter" => FinishReason::Safety,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        _ => FinishReason::Other,
    };

    canonical.to_string()
}

fn finish_message(reason: &str) -> &'static str {
    match reason {
        "length" => "the response was cut off by the token limit",
        "content_filter" => "the response was withheld by the content filter",
        "tool_calls" | "function_call" => "the model requested a tool call",
        _ => "",
    }
}

impl From<ChatCompletion> for ProviderResult {
    fn from(value: ChatCompletion) -> Self {
        let candidates = value
            .choices
            .into_iter()
            .map(|choice| {
                let reason = choice.finish_reason.unwrap_or_default();

                let content = choice
                    .message
                    .content
                    .filter(|text| !text.is_empty())
                    .map(Content::model);

                let finish_message = match choice.message.refusal {
                    Some(refusal) => refusal,
                    None => finish_message(&reason).to_string(),
                };

                Candidate {
                    content,
                    finish_reason: finish_reason(&reason),
                    finish_message,
                    grounding: None,
                }
            })
            .collect();

        let usage = value
            .usage
            .map(|u| CanonicalUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        ProviderResult {
            candidates,
            prompt_feedback: None,
            usage,
        }
    }
}
