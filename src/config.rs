//! The configuration file.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [retry]
//! max_retries = 5
//! min_backoff_ms = 200
//! max_backoff_ms = 10000
//! retry_statuses = [429, 503]
//!
//! [connectors.openai]
//! api_key = "sk-..."
//! org_id = "org-..."
//! timeout_secs = 60
//! regions = ["us-east", "eu-west"]
//! failover = "round-robin"
//!
//! [connectors.custom]
//! endpoint = "http://localhost:8000/v1"
//! options = { model = "mixtral-8x7b", seed = 7 }
//! ```
//!
//! Each `[connectors.<id>]` section is turned into configuration options with
//! [`Config::options_for`], so every value passes through the same validation
//! as options given in code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::options::{
    with_api_key, with_custom_option, with_endpoint, with_org_id, with_region_routing, with_retry_policy,
    with_timeout, ConfigOption, FailoverStrategy,
};
use crate::retry::RetryPolicy;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config \"{}\": {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config \"{}\": {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Logging {
    /// A `tracing` filter directive, e.g. "info" or "modelgate=debug"
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Retry {
    pub max_retries: Option<u32>,
    pub min_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub retry_statuses: Option<Vec<u16>>,
}

impl Retry {
    fn is_set(&self) -> bool {
        self.max_retries.is_some()
            || self.min_backoff_ms.is_some()
            || self.max_backoff_ms.is_some()
            || self.retry_statuses.is_some()
    }

    /// The default policy with the configured values layered on top
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::default();

        if let Some(max_retries) = self.max_retries {
            policy.max_retries = max_retries;
        }

        if let Some(ms) = self.min_backoff_ms {
            policy.min_backoff = Duration::from_millis(ms);
        }

        if let Some(ms) = self.max_backoff_ms {
            policy.max_backoff = Duration::from_millis(ms);
        }

        if let Some(statuses) = &self.retry_statuses {
            policy.retryable_statuses = statuses.iter().copied().collect();
        }

        policy
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct ConnectorSection {
    pub api_key: Option<String>,
    pub org_id: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
    pub regions: Option<Vec<String>>,
    pub failover: Option<FailoverStrategy>,
    /// Connector-specific settings, passed through as custom options
    #[serde(default)]
    pub options: toml::Table,
}

#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorSection>,
    /// Keys found in the file that no section understands, as dotted paths.
    /// Loading happens before logging is set up, so reporting them is left
    /// to the caller.
    #[serde(skip)]
    pub extraneous_keys: Vec<String>,
}

/// Environment variables consulted when a section has no API key
fn api_key_var(connector: &str) -> Option<&'static str> {
    match connector {
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        _ => None,
    }
}

impl Config {
    /// Options for the connector `connector`, in pipeline order: the global
    /// retry policy first, then the connector's section.
    pub fn options_for(&self, connector: &str) -> Vec<ConfigOption> {
        self.options_with_env(connector, |var| std::env::var(var).ok())
    }

    fn options_with_env<F>(&self, connector: &str, env: F) -> Vec<ConfigOption>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Vec::new();

        if self.retry.is_set() {
            options.push(with_retry_policy(self.retry.policy()));
        }

        let section = self.connectors.get(connector).cloned().unwrap_or_default();

        let api_key = section
            .api_key
            .or_else(|| api_key_var(connector).and_then(|var| env(var)))
            .filter(|key| !key.is_empty());

        if let Some(api_key) = api_key {
            options.push(with_api_key(api_key));
        }

        if let Some(org_id) = section.org_id {
            options.push(with_org_id(org_id));
        }

        if let Some(endpoint) = section.endpoint {
            options.push(with_endpoint(endpoint));
        }

        if let Some(secs) = section.timeout_secs {
            options.push(with_timeout(Duration::from_secs(secs)));
        }

        if let Some(regions) = section.regions {
            options.push(with_region_routing(
                !regions.is_empty(),
                regions,
                section.failover.unwrap_or_default(),
            ));
        }

        for (key, value) in section.options {
            match serde_json::to_value(&value) {
                Ok(value) => options.push(with_custom_option(key, value)),
                Err(err) => {
                    tracing::warn!(connector, key = %key, error = %err, "ignoring unrepresentable option")
                }
            }
        }

        options
    }
}

fn get_config_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME");

    if let Some(home) = home {
        let home = PathBuf::from(home);

        const USER_PATHS: [&str; 2] = [".config/modelgate/config.toml", ".modelgate.toml"];

        for &path in USER_PATHS.iter() {
            let fullpath = home.join(path);

            if fullpath.exists() {
                return Some(fullpath);
            }
        }
    }

    let system_config = PathBuf::from("/etc/modelgate.toml");

    if system_config.exists() {
        Some(system_config)
    } else {
        None
    }
}

fn extra_fields_helper<'a>(
    path: &mut Vec<&'a str>,
    user_config: &'a toml::Table,
    config: &'a toml::Table,
    extra: &mut Vec<String>,
) {
    for (user_key, user_value) in user_config {
        path.push(user_key);

        match (user_value, config.get(user_key)) {
            (toml::Value::Table(user_value), Some(toml::Value::Table(config_value))) => {
                extra_fields_helper(path, user_value, config_value, extra)
            }
            (_, Some(_)) => {}
            (_, None) => extra.push(path.join(".")),
        }

        path.pop();
    }
}

/// Keys present in the file which did not survive deserialization
fn extra_fields(config: &Config, raw_config: &str) -> Vec<String> {
    let user_config: toml::Table = match toml::from_str(raw_config) {
        Ok(table) => table,
        Err(_) => return Vec::new(),
    };

    let config: toml::Table = match toml::Value::try_from(config) {
        Ok(toml::Value::Table(table)) => table,
        Ok(_) => return Vec::new(),
        Err(err) => {
            tracing::debug!(error = %err, "could not reserialize the config");
            return Vec::new();
        }
    };

    let mut path = Vec::new();
    let mut extra = Vec::new();

    extra_fields_helper(&mut path, &user_config, &config, &mut extra);

    extra
}

pub fn parse_config(raw_config: &str, path: &Path) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(raw_config).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    config.extraneous_keys = extra_fields(&config, raw_config);

    Ok(config)
}

/// Reads the configuration at `config`, or else at the first of the default
/// locations which exists. Without any file, the defaults apply.
pub fn read_config(config: Option<PathBuf>) -> Result<Config, ConfigError> {
    let config_path = config.or_else(get_config_path);

    let Some(path) = config_path else {
        return Ok(Config::default());
    };

    tracing::debug!(path = %path.display(), "reading config");

    let raw_config = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    parse_config(&raw_config, &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::options::{build, ConnectorConfig};
    use std::io::Write;

    const EXAMPLE: &str = r#"
[logging]
level = "debug"

[retry]
max_retries = 5
min_backoff_ms = 200
retry_statuses = [429, 503]

[connectors.openai]
api_key = "sk-file"
org_id = "org-1"
timeout_secs = 60
regions = ["us-east", "eu-west"]
failover = "round-robin"
options = { seed = 7, user = "me" }

[connectors.custom]
endpoint = "http://localhost:8000/v1"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn sections_become_options() {
        let config = parse_config(EXAMPLE, Path::new("example.toml")).unwrap();

        assert_eq!(config.logging.level.as_deref(), Some("debug"));

        let options = config.options_with_env("openai", no_env);
        let built = build(&ConnectorConfig::default(), &options).unwrap();

        assert_eq!(built.api_key.as_deref(), Some("sk-file"));
        assert_eq!(built.org_id.as_deref(), Some("org-1"));
        assert_eq!(built.timeout, Duration::from_secs(60));
        assert_eq!(built.retry.max_retries, 5);
        assert_eq!(built.retry.min_backoff, Duration::from_millis(200));
        assert_eq!(built.retry.max_backoff, RetryPolicy::default().max_backoff);
        assert_eq!(built.retry.retryable_statuses.len(), 2);
        assert!(built.region_routing.enabled);
        assert_eq!(built.region_routing.failover, FailoverStrategy::RoundRobin);
        assert_eq!(built.custom("seed"), Some(&serde_json::json!(7)));
        assert_eq!(built.custom("user"), Some(&serde_json::json!("me")));

        let custom = build(&ConnectorConfig::default(), &config.options_with_env("custom", no_env)).unwrap();
        assert_eq!(custom.endpoint.unwrap().as_str(), "http://localhost:8000/v1");
    }

    #[test]
    fn api_keys_fall_back_to_the_environment() {
        let config = Config::default();

        let env = |var: &str| (var == "ANTHROPIC_API_KEY").then(|| "sk-env".to_string());

        let built = build(&ConnectorConfig::default(), &config.options_with_env("anthropic", env)).unwrap();
        assert_eq!(built.api_key.as_deref(), Some("sk-env"));

        let built = build(&ConnectorConfig::default(), &config.options_with_env("openai", env)).unwrap();
        assert_eq!(built.api_key, None);
    }

    #[test]
    fn invalid_values_fail_in_the_pipeline() {
        let config = parse_config(
            "[connectors.custom]\nendpoint = \"ftp://example.com\"\n",
            Path::new("bad.toml"),
        )
        .unwrap();

        assert!(matches!(
            build(&ConnectorConfig::default(), &config.options_with_env("custom", no_env)),
            Err(Error::ValidationFailed { field: "endpoint", .. })
        ));
    }

    #[test]
    fn extraneous_keys_are_found() {
        let raw = "editor = \"vim\"\n[retry]\nmax_retries = 1\nbackoff = 3\n[connectors.openai]\napi_key = \"k\"\nkey = \"typo\"\n";
        let config: Config = toml::from_str(raw).unwrap();

        let mut extra = extra_fields(&config, raw);
        extra.sort();

        assert_eq!(extra, ["connectors.openai.key", "editor", "retry.backoff"]);
    }

    #[test]
    fn read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();

        let config = read_config(Some(file.path().to_path_buf())).unwrap();

        assert!(config.connectors.contains_key("openai"));
        assert!(config.connectors.contains_key("custom"));
        assert!(config.extraneous_keys.is_empty());
    }

    #[test]
    fn extraneous_keys_reach_the_caller() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"editor = \"vim\"\n[retry]\nbackoff = 3\n").unwrap();

        let mut config = read_config(Some(file.path().to_path_buf())).unwrap();
        config.extraneous_keys.sort();

        assert_eq!(config.extraneous_keys, ["editor", "retry.backoff"]);
    }

    #[test]
    fn read_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = read_config(Some(dir.path().join("missing.toml")));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[retry\n").unwrap();

        assert!(matches!(read_config(Some(path)), Err(ConfigError::Parse { .. })));
    }
}
