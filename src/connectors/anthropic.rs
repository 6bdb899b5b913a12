//! The Anthropic connector, speaking the `/v1/messages` API

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{http, Connector, ConnectorRegistry, ErrorKind, ProviderError, ProviderIdentifier};
use crate::chat::{Content, Role as ChatRole};
use crate::error::Result;
use crate::options::{self, ConfigOption, ConnectorConfig};
use crate::request::Request;
use crate::response::{normalize, Candidate, FinishReason, ProviderResult, Response, Usage as CanonicalUsage};
use crate::retry::Retrier;

pub const PATTERNS: [&str; 1] = ["^claude-3.*"];

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";

const API_VERSION: &str = "2023-06-01";

/// The messages API requires a limit; this applies when the request has none
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// Short names callers use, mapped to the identifiers the API accepts.
// Anything else is sent as-is.
const MODEL_ALIASES: [(&str, &str); 4] = [
    ("claude-3-opus", "claude-3-opus-latest"),
    ("claude-3-sonnet", "claude-3-sonnet-20240229"),
    ("claude-3-haiku", "claude-3-haiku-20240307"),
    ("claude-3.5-sonnet", "claude-3-5-sonnet-latest"),
];

fn api_model(model: &str) -> &str {
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == model)
        .map_or(model, |(_, id)| *id)
}

/* Structures to serialize /messages */

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Debug)]
struct Message {
    role: Role,
    content: String,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'r> {
    model: &'r str,
    max_tokens: u32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

impl<'r> MessagesRequest<'r> {
    /// System entries in the conversation are folded into the `system`
    /// parameter; the API has no system role.
    fn new(model: &'r str, request: &Request) -> MessagesRequest<'r> {
        let mut system: Vec<String> = request.system_instruction().map(str::to_string).into_iter().collect();
        let mut messages = Vec::with_capacity(request.contents.len());

        for content in &request.contents {
            let role = match content.role {
                ChatRole::System => {
                    system.push(content.text());
                    continue;
                }
                ChatRole::User => Role::User,
                ChatRole::Model => Role::Assistant,
            };

            messages.push(Message {
                role,
                content: content.text(),
            });
        }

        let config = request.config.clone().unwrap_or_default();

        MessagesRequest {
            model,
            max_tokens: config.max_tokens.filter(|n| *n > 0).unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            temperature: config.temperature,
            top_p: config.top_p,
            stop_sequences: config.stop_sequences,
        }
    }
}

/* Structures to deseralize /messages */

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

impl From<MessagesResponse> for ProviderResult {
    fn from(value: MessagesResponse) -> Self {
        let mut text = String::new();

        for block in value.content {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::ToolUse { name } => {
                    tracing::debug!(tool = %name, "ignoring tool use block");
                }
                ContentBlock::Unknown => {}
            }
        }

        let reason = value.stop_reason.unwrap_or_default();

        let (finish_reason, finish_message) = match reason.as_str() {
            "" => (String::new(), ""),
            "end_turn" | "stop_sequence" => (FinishReason::Stop.to_string(), ""),
            "max_tokens" => (
                FinishReason::MaxTokens.to_string(),
                "the response was cut off by the token limit",
            ),
            "tool_use" => (FinishReason::ToolUse.to_string(), "the model requested a tool call"),
            "refusal" => (FinishReason::Safety.to_string(), "the model declined to answer"),
            _ => (FinishReason::Other.to_string(), ""),
        };

        let usage = value
            .usage
            .map(|u| CanonicalUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        // A truncated answer still has content and is reported as a success
        let content = (!text.is_empty()).then(|| Content::model(text));

        ProviderResult {
            candidates: vec![Candidate {
                content,
                finish_reason,
                finish_message: finish_message.to_string(),
                grounding: None,
            }],
            prompt_feedback: None,
            usage,
        }
    }
}

pub struct AnthropicConnector {
    model: String,
    config: ConnectorConfig,
    client: Client,
}

impl AnthropicConnector {
    async fn attempt(&self, body: &MessagesRequest<'_>, attempt: u32) -> Result<MessagesResponse, ProviderError> {
        let base = self
            .config
            .endpoint_for_attempt(DEFAULT_API_BASE, attempt)
            .map_err(|e| ProviderError::from_source(ErrorKind::BadRequest, Box::new(e)))?;

        let mut req = self
            .client
            .post(http::join(&base, "messages")?)
            .header("anthropic-version", API_VERSION)
            .json(body);

        if let Some(api_key) = &self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        if let Some(org_id) = &self.config.org_id {
            req = req.header("anthropic-organization", org_id);
        }

        http::send_json(req).await
    }
}

#[async_trait]
impl Connector for AnthropicConnector {
    fn id(&self) -> ProviderIdentifier {
        ProviderIdentifier::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        request.validate()?;

        let body = MessagesRequest::new(api_model(&self.model), request);
        let body = &body;

        let started = Instant::now();
        let mut retrier = Retrier::new(self.config.retry.clone());

        let reply = retrier
            .run(cancel, move |attempt| self.attempt(body, attempt))
            .await?;

        let mut response = normalize(reply.into());
        response.usage.latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(response)
    }

    fn supported_models(&self) -> Vec<String> {
        MODEL_ALIASES.iter().map(|(alias, _)| alias.to_string()).collect()
    }
}

/// Builds an Anthropic connector; an API key is required
pub fn connector(model: &str, options: &[ConfigOption]) -> Result<Box<dyn Connector>> {
    let config = options::build(&ConnectorConfig::default(), options)?;

    config.require_api_key()?;

    Ok(Box::new(AnthropicConnector {
        model: model.to_string(),
        client: http::client(&config)?,
        config,
    }))
}

pub fn register(registry: &ConnectorRegistry) -> Result<()> {
    registry.register_all(PATTERNS, Arc::new(connector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::options::{with_api_key, with_endpoint};
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn aliases() {
        assert_eq!(api_model("claude-3-sonnet"), "claude-3-sonnet-20240229");
        assert_eq!(api_model("claude-3.5-sonnet"), "claude-3-5-sonnet-latest");
        assert_eq!(api_model("claude-3-opus-20240229"), "claude-3-opus-20240229");
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(
            connector("claude-3-sonnet", &[]),
            Err(Error::MissingRequiredConfig("api_key"))
        ));
    }

    #[test]
    fn system_entries_are_folded() {
        let mut request = Request::new("claude-3-haiku")
            .with_content(Content::system("you are terse"))
            .with_content(Content::user("hi"))
            .with_content(Content::model("hello"));
        request.append_instructions(["answer in French"]);

        let body = serde_json::to_value(MessagesRequest::new("claude-3-haiku-20240307", &request)).unwrap();

        assert_eq!(
            body,
            json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": DEFAULT_MAX_TOKENS,
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                ],
                "system": "answer in French\n\nyou are terse",
            })
        );
    }

    #[test]
    fn truncated_answers_keep_their_content() {
        let reply: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "partial"}],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 10, "output_tokens": 4096},
        }))
        .unwrap();

        let response = normalize(reply.into());

        assert!(!response.is_error());
        assert_eq!(response.text().as_deref(), Some("partial"));
        assert_eq!(response.usage.total_tokens, 4106);
    }

    #[test]
    fn empty_answers_report_the_stop_reason() {
        let reply: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "tool_use", "id": "t1", "name": "weather", "input": {}}],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5},
        }))
        .unwrap();

        let response = normalize(reply.into());

        assert_eq!(response.error_code.as_deref(), Some("TOOL_USE"));
        assert_eq!(response.error_message.as_deref(), Some("the model requested a tool call"));
    }

    #[tokio::test]
    async fn messages() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-3-opus-latest",
                "max_tokens": 256,
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "text", "text": "Bonjour"}],
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 12, "output_tokens": 2},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let connector = connector(
            "claude-3-opus",
            &[with_api_key("test-key"), with_endpoint(server.url())],
        )
        .unwrap();

        let mut request = Request::new("claude-3-opus").with_content(Content::user("Hello"));
        request.config = Some(crate::request::GenerationConfig {
            max_tokens: Some(256),
            ..Default::default()
        });

        let response = connector.call(&CancellationToken::new(), &request).await.unwrap();

        assert_eq!(response.text().as_deref(), Some("Bonjour"));
        assert_eq!(response.usage.total_tokens, 14);
        mock.assert_async().await;
    }
}
