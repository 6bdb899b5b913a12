//! Plumbing shared by the connectors which speak HTTP

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{ErrorKind, ProviderError};
use crate::options::ConnectorConfig;

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_decode() || err.is_redirect() {
            ErrorKind::UnexpectedResponse
        } else if err.is_timeout() {
            ErrorKind::TimedOut
        } else if err.is_connect() {
            ErrorKind::Connection
        } else if err.is_builder() {
            ErrorKind::BadRequest
        } else {
            ErrorKind::UnspecifiedError
        };

        ProviderError::from_source(kind, Box::new(err))
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        ProviderError::from_source(ErrorKind::BadRequest, Box::new(err))
    }
}

/// A client enforcing the configured timeout
pub(crate) fn client(config: &ConnectorConfig) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(config.effective_timeout())
        .build()?)
}

/// Joins `path` onto `base`, keeping every segment of `base`.
///
/// `Url::join` replaces the last segment of a base without a trailing slash,
/// so "http://host/v1" joined with "chat" would otherwise give "http://host/chat".
pub(crate) fn join(base: &Url, path: &str) -> Result<Url, ProviderError> {
    let mut base = base.clone();

    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }

    Ok(base.join(path.trim_start_matches('/'))?)
}

// Vendors disagree on the shape of their error bodies
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    /// `{"error": {"message": "...", "type": "..."}}` (OpenAI, Anthropic)
    Nested { error: ErrorDetail },
    /// `{"error": "..."}` (Ollama)
    Flat { error: String },
    /// `{"message": "..."}`
    Message { message: String },
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Ok(ErrorBody::Message { message }) => message,
        Err(_) => body.trim().to_string(),
    };

    (!message.is_empty()).then_some(message)
}

/// Turns an unsuccessful response into an error carrying its status
pub(crate) async fn error_from_response(res: Response) -> ProviderError {
    let status = res.status();

    // The status is what matters; a body we cannot read only costs us the message
    let body = res.text().await.unwrap_or_default();

    let message = error_message(&body)
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_default();

    ProviderError::from_status(status.as_u16(), message)
}

/// Sends `request` and decodes a successful JSON reply
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ProviderError> {
    let res = request.send().await?;

    if !res.status().is_success() {
        return Err(error_from_response(res).await);
    }

    Ok(res.json::<T>().await?)
}
