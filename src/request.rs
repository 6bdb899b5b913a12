//! The canonical request shape handed to connectors.

use serde::{Deserialize, Serialize};

use crate::chat::Content;
use crate::error::{Error, Result};

pub const JSON_MIME_TYPE: &str = "application/json";

/// Something that can be declared to a model as a callable tool.
///
/// Declarations are carried on the request as opaque strings; connectors do
/// not translate them into vendor tool protocols.
pub trait Tool {
    fn name(&self) -> &str;

    fn declaration(&self) -> Result<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_declarations: Vec<String>,
}

/// Generation settings shared by all providers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

/// A single call to a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The model identifier, e.g. "gpt-4-turbo"
    pub model: String,
    /// The conversation, oldest entry first
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerationConfig>,
}

impl Request {
    pub fn new(model: impl Into<String>) -> Request {
        Request {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: Content) -> Request {
        self.contents.push(content);
        self
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Request {
        self.config = Some(config);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(Error::InvalidRequest("a model identifier is required"));
        }

        if self.contents.is_empty() {
            return Err(Error::InvalidRequest(
                "a request must contain at least one content entry",
            ));
        }

        Ok(())
    }

    fn config_mut(&mut self) -> &mut GenerationConfig {
        self.config.get_or_insert_with(GenerationConfig::default)
    }

    /// Appends instructions to the system instruction, separating each one
    /// with a blank line.
    pub fn append_instructions<I, S>(&mut self, instructions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = instructions
            .into_iter()
            .map(|s| s.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join("\n\n");

        let config = self.config_mut();

        config.system_instruction = match config.system_instruction.take() {
            Some(existing) if !existing.is_empty() => Some(format!("{existing}\n\n{joined}")),
            _ => Some(joined),
        };
    }

    /// Declares tools on the request. Nothing is added when `tools` is empty.
    pub fn append_tools(&mut self, tools: &[&dyn Tool]) -> Result<()> {
        if tools.is_empty() {
            return Ok(());
        }

        let mut function_declarations = Vec::with_capacity(tools.len());

        for tool in tools {
            tracing::debug!(tool = tool.name(), "declaring tool");
            function_declarations.push(tool.declaration()?);
        }

        self.config_mut().tools.push(ToolDeclaration {
            function_declarations,
        });

        Ok(())
    }

    /// Asks the model to answer with JSON matching `schema`.
    pub fn set_output_schema(&mut self, schema: serde_json::Value) {
        let config = self.config_mut();

        config.response_schema = Some(schema);
        config.response_mime_type = Some(JSON_MIME_TYPE.to_string());
    }

    pub(crate) fn system_instruction(&self) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|c| c.system_instruction.as_deref())
            .filter(|s| !s.is_empty())
    }
}
