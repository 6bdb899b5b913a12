//! Connector configuration and the option pipeline that builds it.
//!
//! A [`ConnectorConfig`] is produced by [`build`], which applies an ordered
//! list of [`ConfigOption`]s to a copy of some defaults. Options only touch
//! the configuration they are given; a later option setting the same field
//! overwrites an earlier one. The first option to reject its value stops the
//! pipeline and its error is returned.
//!
//! Required fields are checked by the connector after the pipeline has run,
//! with [`ConnectorConfig::require_api_key`] and
//! [`ConnectorConfig::require_endpoint`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Used when no timeout, or a zero timeout, is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A single step of the pipeline
pub type ConfigOption = Box<dyn Fn(&mut ConnectorConfig) -> Result<()> + Send + Sync>;

/// How a region is picked when requests are retried
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailoverStrategy {
    /// Start with the first region and move to the next one on each retry,
    /// staying on the last
    #[default]
    Sequential,
    /// Cycle through the regions
    RoundRobin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRouting {
    pub enabled: bool,
    /// Regions in order of preference
    pub preferred_regions: Vec<String>,
    pub failover: FailoverStrategy,
}

impl RegionRouting {
    fn region_for_attempt(&self, attempt: u32) -> Option<&str> {
        if !self.enabled || self.preferred_regions.is_empty() {
            return None;
        }

        let n = self.preferred_regions.len();
        let i = attempt as usize;

        let index = match self.failover {
            FailoverStrategy::Sequential => i.min(n - 1),
            FailoverStrategy::RoundRobin => i % n,
        };

        Some(&self.preferred_regions[index])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub endpoint: Option<Url>,
    /// Request timeout. Zero means "not set", see [`ConnectorConfig::effective_timeout`].
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub region_routing: RegionRouting,
    /// Provider-specific settings
    pub custom: BTreeMap<String, serde_json::Value>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            api_key: None,
            org_id: None,
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            region_routing: RegionRouting::default(),
            custom: BTreeMap::new(),
        }
    }
}

impl ConnectorConfig {
    /// The timeout to enforce. An unset (zero) timeout never disables timeout
    /// protection; the default applies instead.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::MissingRequiredConfig("api_key")),
        }
    }

    pub fn require_endpoint(&self) -> Result<&Url> {
        self.endpoint
            .as_ref()
            .ok_or(Error::MissingRequiredConfig("endpoint"))
    }

    /// The base URL to use for the given attempt.
    ///
    /// An endpoint override always wins. Otherwise, when region routing is
    /// enabled, the region chosen by the failover strategy is appended to
    /// `default_base` as an extra path segment.
    pub fn endpoint_for_attempt(&self, default_base: &str, attempt: u32) -> Result<Url> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }

        let base = match self.region_routing.region_for_attempt(attempt) {
            Some(region) => format!("{}/{}", default_base.trim_end_matches('/'), region),
            None => default_base.to_string(),
        };

        parse_endpoint(&base)
    }

    pub fn custom(&self, key: &str) -> Option<&serde_json::Value> {
        self.custom.get(key)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).map_err(|e| Error::ValidationFailed {
        field: "endpoint",
        reason: format!("\"{endpoint}\" is not a valid URL: {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::ValidationFailed {
            field: "endpoint",
            reason: format!("unsupported scheme \"{scheme}\""),
        }),
    }
}

/// Applies `options` in order to a copy of `defaults`.
pub fn build(defaults: &ConnectorConfig, options: &[ConfigOption]) -> Result<ConnectorConfig> {
    let mut config = defaults.clone();

    for option in options {
        option(&mut config)?;
    }

    Ok(config)
}

pub fn with_api_key(api_key: impl Into<String>) -> ConfigOption {
    let api_key = api_key.into();

    Box::new(move |config| {
        config.api_key = Some(api_key.clone());
        Ok(())
    })
}

pub fn with_org_id(org_id: impl Into<String>) -> ConfigOption {
    let org_id = org_id.into();

    Box::new(move |config| {
        config.org_id = Some(org_id.clone());
        Ok(())
    })
}

/// Overrides the provider endpoint. The value must be an http(s) URL.
pub fn with_endpoint(endpoint: impl Into<String>) -> ConfigOption {
    let endpoint = endpoint.into();

    Box::new(move |config| {
        config.endpoint = Some(parse_endpoint(&endpoint)?);
        Ok(())
    })
}

/// Sets the request timeout. Zero leaves the timeout unset.
pub fn with_timeout(timeout: Duration) -> ConfigOption {
    Box::new(move |config| {
        config.timeout = timeout;
        Ok(())
    })
}

pub fn with_retry_policy(policy: RetryPolicy) -> ConfigOption {
    Box::new(move |config| {
        if policy.min_backoff > policy.max_backoff {
            return Err(Error::ValidationFailed {
                field: "retry",
                reason: format!(
                    "minimum backoff {:?} exceeds maximum backoff {:?}",
                    policy.min_backoff, policy.max_backoff
                ),
            });
        }

        config.retry = policy.clone();
        Ok(())
    })
}

pub fn with_region_routing(
    enabled: bool,
    regions: Vec<String>,
    failover: FailoverStrategy,
) -> ConfigOption {
    Box::new(move |config| {
        if regions.iter().any(|r| r.trim().is_empty()) {
            return Err(Error::ValidationFailed {
                field: "region_routing",
                reason: "region names cannot be empty".to_string(),
            });
        }

        config.region_routing = RegionRouting {
            enabled,
            preferred_regions: regions.clone(),
            failover,
        };
        Ok(())
    })
}

pub fn with_custom_option(key: impl Into<String>, value: serde_json::Value) -> ConfigOption {
    let key = key.into();

    Box::new(move |config| {
        if key.is_empty() {
            return Err(Error::ValidationFailed {
                field: "custom",
                reason: "option keys cannot be empty".to_string(),
            });
        }

        config.custom.insert(key.clone(), value.clone());
        Ok(())
    })
}
