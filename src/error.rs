//! The crate-wide error type.
//!
//! Every failure that reaches a caller carries a machine-readable code
//! ([`Error::code`]) alongside its human-readable `Display` message.

use thiserror::Error;

use crate::connectors::ProviderError;

#[derive(Error, Debug)]
pub enum Error {
    /// A pattern handed to a registry is not a valid regular expression
    #[error("invalid model pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// No registered pattern matches the model identifier
    #[error("no registered pattern matches model \"{0}\"")]
    NotFound(String),

    /// The option pipeline finished but a field the connector needs is unset
    #[error("missing required configuration \"{0}\"")]
    MissingRequiredConfig(&'static str),

    /// A configuration option rejected its value
    #[error("invalid value for \"{field}\": {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    /// A request failed validation before reaching a provider
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// The caller cancelled the operation
    #[error("the operation was cancelled")]
    CancellationRequested,

    /// Every attempt allowed by the retry policy failed with a retryable error
    #[error("giving up after {attempts} attempts: {last}")]
    RetryBudgetExhausted {
        attempts: u32,
        #[source]
        last: ProviderError,
    },

    /// An element of a batch failed; the remaining elements were abandoned
    #[error("error processing request {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    /// The provider rejected the request or could not be reached
    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl Error {
    /// A stable, machine-readable code for the failure.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidPattern { .. } => "INVALID_PATTERN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::MissingRequiredConfig(_) => "MISSING_REQUIRED_CONFIG",
            Error::ValidationFailed { .. } => "VALIDATION_FAILED",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::CancellationRequested => "CANCELLED",
            Error::RetryBudgetExhausted { .. } => "RETRY_BUDGET_EXHAUSTED",
            Error::Batch { source, .. } => source.code(),
            Error::Provider(err) => err.code(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ErrorKind;

    #[test]
    fn batch_errors_name_the_failing_index() {
        let err = Error::Batch {
            index: 1,
            source: Box::new(Error::InvalidRequest("request has no contents")),
        };

        assert_eq!(
            err.to_string(),
            "error processing request 1: invalid request: request has no contents"
        );
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn provider_codes_pass_through() {
        let err: Error = ProviderError::from_kind(ErrorKind::ExcessUsage).into();

        assert_eq!(err.code(), "RATE_LIMITED");
    }

    #[test]
    fn missing_config_names_the_field() {
        let err = Error::MissingRequiredConfig("api_key");

        assert!(err.to_string().contains("api_key"));
        assert_eq!(err.code(), "MISSING_REQUIRED_CONFIG");
    }
}
