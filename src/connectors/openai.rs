//! An umbrella module for the OpenAI connector
//!
//! The connector speaks the `/chat/completions` API, which a number of other
//! services implement as well; the `custom` connector reuses it for them.

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

pub const PATTERNS: [&str; 2] = ["^gpt-4.*", r"^gpt-3\.5-turbo.*"];

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";

// The OpenAI API does not include an API route to list the chat models. This
// list needs to be updated whenever new models are added.
const SUPPORTED_MODELS: [&str; 5] = ["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-4", "gpt-3.5-turbo"];

/// A client for a model behind an OpenAI-compatible API
pub struct OpenAIConnector {
    id: ProviderIdentifier,
    model: String,
    /// The model name sent upstream
    upstream_model: String,
    default_api_base: &'static str,
    config: ConnectorConfig,
    client: Client,
}

impl OpenAIConnector {
    pub(super) fn new(
        id: ProviderIdentifier,
        model: &str,
        upstream_model: String,
        default_api_base: &'static str,
        config: ConnectorConfig,
    ) -> Result<OpenAIConnector> {
        let client = http::client(&config)?;

        Ok(OpenAIConnector {
            id,
            model: model.to_string(),
            upstream_model,
            default_api_base,
            config,
            client,
        })
    }

    async fn attempt(
        &self,
        body: &api::ChatCompletionRequest<'_>,
        attempt: u32,
    ) -> Result<api::ChatCompletion, ProviderError> {
        let base = self
            .config
            .endpoint_for_attempt(self.default_api_base, attempt)
            .map_err(|e| ProviderError::from_source(ErrorKind::BadRequest, Box::new(e)))?;

        let url = http::join(&base, "chat/completions")?;

        let mut req = self.client.post(url).json(body);

        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        if let Some(org_id) = &self.config.org_id {
            req = req.header(ORGANIZATION_HEADER, org_id);
        }

        http::send_json(req).await
    }
}

#[async_trait]
impl Connector for OpenAIConnector {
    fn id(&self) -> ProviderIdentifier {
        self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, cancel: &CancellationToken, request: &Request) -> Result<Response> {
        request.validate()?;

        let body = api::ChatCompletionRequest::new(&self.upstream_model, request, &self.config.custom);
        let body = &body;

        let started = Instant::now();
        let mut retrier = Retrier::new(self.config.retry.clone());

        let completion = retrier
            .run(cancel, move |attempt| self.attempt(body, attempt))
            .await?;

        let mut response = normalize(completion.into());
        response.usage.latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(response)
    }

    fn supported_models(&self) -> Vec<String> {
        match self.id {
            ProviderIdentifier::OpenAI => SUPPORTED_MODELS.iter().map(|m| m.to_string()).collect(),
            _ => vec![self.upstream_model.clone()],
        }
    }
}

/// Builds an OpenAI connector; an API key is required
pub fn connector(model: &str, options: &[ConfigOption]) -> Result<Box<dyn Connector>> {
    let config = options::build(&ConnectorConfig::default(), options)?;

    config.require_api_key()?;

    Ok(Box::new(OpenAIConnector::new(
        ProviderIdentifier::OpenAI,
        model,
        model.to_string(),
        DEFAULT_API_BASE,
        config,
    )?))
}

pub fn register(registry: &ConnectorRegistry) -> Result<()> {
    registry.register_all(PATTERNS, Arc::new(connector))
}
