//! The Ollama connector, for models served by a local (or remote) Ollama
//! daemon. No API key is needed.
//!
//! Models are addressed either as `ollama/<name>` or by a bare `llama-*`
//! identifier; the `ollama/` prefix is stripped before the name is sent.

mod api;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::{http, Connector, ConnectorRegistry, ErrorKind, ProviderError, ProviderIdentifier};
use crate::error::Result;
use crate::options::{self, ConfigOption, ConnectorConfig};
use crate::request::Request;
use crate::response::{normalize, Response};
use crate::retry::Retrier;

pub const PATTERNS: [&str; 2] = ["^ollama/.+", "^llama-.*"];

pub const DEFAULT_API_BASE: &str = "http://localhost:11434";

const MODEL_PREFIX: &str = "ollama/";

pub struct OllamaConnector {
    model: String,
    upstream_model: String,
    config: ConnectorConfig,
    client: Client,
}

impl OllamaConnector {
    async fn attempt(&self, body: &api::ChatRequest<'_>, attempt: u32) -> Result<api::ChatResponse, ProviderError> {
        let base = self
            .config
            .endpoint_for_attempt(DEFAULT_API_BASE, attempt)
            .map_err(|e| ProviderError::from_source(ErrorKind::BadRequest, Box::new(e)))?;

        let req = self.client.post(http::join(&base, "api/chat")?).json(body);

        http::send_json(req).await
    }
}

#[async_trait]
impl Connector for OllamaConnector {
    fn id(&self) -> ProviderIdentifier {
        ProviderIdentifier::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        request.validate()?;

        let body = api::ChatRequest::new(&self.upstream_model, request);
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
        vec![self.upstream_model.clone()]
    }
}

pub fn connector(model: &str, options: &[ConfigOption]) -> Result<Box<dyn Connector>> {
    let config = options::build(&ConnectorConfig::default(), options)?;

    let upstream_model = model.strip_prefix(MODEL_PREFIX).unwrap_or(model).to_string();

    Ok(Box::new(OllamaConnector {
        model: model.to_string(),
        upstream_model,
        client: http::client(&config)?,
        config,
    }))
}

pub fn register(registry: &ConnectorRegistry) -> Result<()> {
    registry.register_all(PATTERNS, Arc::new(connector))
}
