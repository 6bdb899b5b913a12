//! Connectors: clients for a single model behind a vendor API.
//!
//! Every connector implements the [`Connector`] trait, a general interface for
//! sending canonical [`Request`]s to one model and getting canonical
//! [`Response`]s back. Connectors are never built directly by callers.
//! Instead, each connector module registers a [`Constructor`] under the
//! identifier patterns it handles, and callers go through
//! [`ConnectorRegistry::connect`]:
//!
//! ```text
//! model id + options -> resolve constructor -> run option pipeline
//!                    -> validate required fields -> Box<dyn Connector>
//! ```
//!
//! ## Error Handling
//!
//! Each API has its own bespoke error system with varying levels of rigor.
//! Connectors translate them into a [`ProviderError`], whose [`ErrorKind`]
//! gives the category of the failure. When the failure came with an HTTP
//! status, the status is kept: it is the signal the retry loop classifies.

pub mod anthropic;
pub mod custom;
pub(crate) mod http;
pub mod ollama;
pub mod openai;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use strum::IntoEnumIterator;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::options::ConfigOption;
use crate::registry::PatternRegistry;
use crate::request::Request;
use crate::response::Response;

/// The `ProviderIdentifier` is a unique per-connector identifier.
///
/// The `to_string` and `FromStr` are part of the CLI and the configuration
/// file and should remain stable.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderIdentifier {
    OpenAI,
    Anthropic,
    Ollama,
    Custom,
}

impl ProviderIdentifier {
    fn patterns(self) -> &'static [&'static str] {
        match self {
            ProviderIdentifier::OpenAI => &openai::PATTERNS,
            ProviderIdentifier::Anthropic => &anthropic::PATTERNS,
            ProviderIdentifier::Ollama => &ollama::PATTERNS,
            ProviderIdentifier::Custom => &custom::PATTERNS,
        }
    }

    /// The built-in connector whose patterns match `model`, if any. Used to
    /// pick configuration before a connector exists.
    pub fn for_model(model: &str) -> Option<ProviderIdentifier> {
        ProviderIdentifier::iter().find(|id| {
            id.patterns()
                .iter()
                .filter_map(|p| regex::Regex::new(p).ok())
                .any(|re| re.is_match(model))
        })
    }
}

/// This is a list specifying general categories of errors that can be
/// returned by a [`Connector`]. This list may be updated as connectors are
/// added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to connect to the underlying API service. This could be due to
    /// network issues like DNS resolution, connectivity issues, or routing
    /// problems.
    Connection,
    /// A request timed out.
    TimedOut,
    /// An API key was not accepted or service-specific permissions are
    /// needed.
    Authentication,
    /// A rate limit was reached or a quota was exceeded.
    ExcessUsage,
    /// The servers are overloaded. This is non-fatal and indicates that a
    /// retry may be needed later.
    ApiOverloaded,
    /// The requested resource was not found. This likely means that the
    /// model requested by the user was not found.
    NotFound,
    /// The request was malformed or is otherwise improper. This often
    /// corresponds to errors with HTTP status codes in the 400s.
    BadRequest,
    /// The server encountered an error. This often corresponds to errors with
    /// HTTP status codes in the 500s.
    InternalError,
    /// An API response was unable to be deserialized, malformed, or otherwise
    /// violated the assumptions of the client.
    UnexpectedResponse,
    /// The number of tokens in the request exceeds the maximum limit imposed
    /// on the model.
    ContextExceeded,
    /// An error that does not fit into any of the other categories.
    UnspecifiedError,
}

impl ErrorKind {
    /// The category implied by an HTTP error status
    pub fn from_status(status: u16) -> ErrorKind {
        match status {
            401 | 403 => ErrorKind::Authentication,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::TimedOut,
            413 => ErrorKind::ContextExceeded,
            429 => ErrorKind::ExcessUsage,
            503 | 529 => ErrorKind::ApiOverloaded,
            400..=499 => ErrorKind::BadRequest,
            500..=599 => ErrorKind::InternalError,
            _ => ErrorKind::UnspecifiedError,
        }
    }

    fn description(self) -> &'static str {
        match self {
            ErrorKind::Connection => "failed to connect to the API service",
            ErrorKind::TimedOut => "request timed out",
            ErrorKind::Authentication => "authentication failed or not provided",
            ErrorKind::ExcessUsage => "rate limit exceeded or quota crossed",
            ErrorKind::ApiOverloaded => "API server(s) are currently overloaded",
            ErrorKind::NotFound => "the requested resource was not found",
            ErrorKind::BadRequest => "the request was bad or malformed",
            ErrorKind::InternalError => "the server encountered an internal error",
            ErrorKind::UnexpectedResponse => "API response was unexpected or malformed",
            ErrorKind::ContextExceeded => "the model context was exceeded",
            ErrorKind::UnspecifiedError => "an unspecified error occurred",
        }
    }

    fn code(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION_FAILED",
            ErrorKind::TimedOut => "TIMED_OUT",
            ErrorKind::Authentication => "AUTHENTICATION_FAILED",
            ErrorKind::ExcessUsage => "RATE_LIMITED",
            ErrorKind::ApiOverloaded => "API_OVERLOADED",
            ErrorKind::NotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::UnexpectedResponse => "UNEXPECTED_RESPONSE",
            ErrorKind::ContextExceeded => "CONTEXT_EXCEEDED",
            ErrorKind::UnspecifiedError => "UNSPECIFIED_ERROR",
        }
    }
}

/// A failure reported by (or while talking to) a provider
#[derive(Debug)]
pub struct ProviderError {
    kind: ErrorKind,
    status: Option<u16>,
    message: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ProviderError {
    pub fn from_kind(kind: ErrorKind) -> ProviderError {
        ProviderError {
            kind,
            status: None,
            message: None,
            source: None,
        }
    }

    pub fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> ProviderError {
        ProviderError {
            kind,
            status: None,
            message: None,
            source: Some(source),
        }
    }

    /// An error response from the API, with the message the API gave
    pub fn from_status(status: u16, message: impl Into<String>) -> ProviderError {
        let message = message.into();

        ProviderError {
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message: (!message.is_empty()).then_some(message),
            source: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> ProviderError {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The HTTP status the provider answered with, if it answered at all
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.description())?;

        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }

        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }

        Ok(())
    }
}

impl StdError for ProviderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// A trait implemented by all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the connector identifier.
    fn id(&self) -> ProviderIdentifier;

    /// The identifier of the model this connector was built for.
    fn model(&self) -> &str;

    /// Sends a single request and returns the normalized response.
    ///
    /// Provider-side refusals (a blocked prompt, an empty candidate) are
    /// reported through the error fields of the `Response`. Transport and
    /// API failures are reported as `Err`.
    async fn call(&self, cancel: &CancellationToken, request: &Request) -> Result<Response>;

    /// Sends each request in turn. The first failure stops the batch and is
    /// reported with the index of the request that caused it.
    async fn batch_call(
        &self,
        cancel: &CancellationToken,
        requests: &[Request],
    ) -> Result<Vec<Response>> {
        let mut responses = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            let response = self
                .call(cancel, request)
                .await
                .map_err(|source| Error::Batch {
                    index,
                    source: Box::new(source),
                })?;

            responses.push(response);
        }

        Ok(responses)
    }

    /// Models the connector is known to support. Other identifiers matching
    /// its patterns may work as well.
    fn supported_models(&self) -> Vec<String>;
}

/// Builds a connector for a model, given the caller's options
pub type Constructor =
    Arc<dyn Fn(&str, &[ConfigOption]) -> Result<Box<dyn Connector>> + Send + Sync>;

/// Connector constructors, keyed by identifier patterns
#[derive(Default)]
pub struct ConnectorRegistry {
    patterns: PatternRegistry<Constructor>,
}

impl ConnectorRegistry {
    /// An empty registry
    pub fn new() -> ConnectorRegistry {
        ConnectorRegistry::default()
    }

    /// A registry holding the reference connectors
    pub fn with_builtin() -> Result<ConnectorRegistry> {
        let registry = ConnectorRegistry::new();

        openai::register(&registry)?;
        anthropic::register(&registry)?;
        ollama::register(&registry)?;
        custom::register(&registry)?;

        Ok(registry)
    }

    pub fn register(&self, pattern: &str, constructor: Constructor) -> Result<()> {
        self.patterns.register(pattern, constructor)
    }

    pub fn register_all<I, S>(&self, patterns: I, constructor: Constructor) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.patterns.register_all(patterns, constructor)
    }

    pub fn resolve(&self, model: &str) -> Result<Constructor> {
        self.patterns.resolve(model)
    }

    /// Builds a connector for `model`
    pub fn connect(&self, model: &str, options: &[ConfigOption]) -> Result<Box<dyn Connector>> {
        let constructor = self.resolve(model)?;

        let connector = constructor(model, options)?;

        tracing::debug!(model, connector = %connector.id(), "built connector");

        Ok(connector)
    }

    pub fn list(&self) -> Vec<String> {
        self.patterns.list()
    }

    pub fn clear(&self) {
        self.patterns.clear()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
