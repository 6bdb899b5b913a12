//! Models served from a caller-supplied endpoint speaking the OpenAI
//! `/chat/completions` API (vLLM, llama.cpp server, LiteLLM, ...).
//!
//! The endpoint must be set. The name sent upstream defaults to the model
//! identifier and can be replaced with the `model` custom option.

use std::sync::Arc;

use super::openai::OpenAIConnector;
use super::{Connector, ConnectorRegistry, ProviderIdentifier};
use crate::error::{Error, Result};
use crate::options::{self, ConfigOption, ConnectorConfig};

pub const PATTERNS: [&str; 1] = ["^custom-.*"];

/// Custom option naming the model upstream
pub const UPSTREAM_MODEL_OPTION: &str = "model";

pub fn connector(model: &str, options: &[ConfigOption]) -> Result<Box<dyn Connector>> {
    let config = options::build(&ConnectorConfig::default(), options)?;

    config.require_endpoint()?;

    let upstream_model = match config.custom(UPSTREAM_MODEL_OPTION) {
        None => model.to_string(),
        Some(serde_json::Value::String(name)) if !name.is_empty() => name.clone(),
        Some(other) => {
            return Err(Error::ValidationFailed {
                field: "custom",
                reason: format!("\"{UPSTREAM_MODEL_OPTION}\" must be a non-empty string, not {other}"),
            })
        }
    };

    // The endpoint is always set, so the default base is never used
    Ok(Box::new(OpenAIConnector::new(
        ProviderIdentifier::Custom,
        model,
        upstream_model,
        "http://localhost",
        config,
    )?))
}

pub fn register(registry: &ConnectorRegistry) -> Result<()> {
    registry.register_all(PATTERNS, Arc::new(connector))
}
