use std::time::Duration;

use modelgate::chat::Content;
use modelgate::config::Config;
use modelgate::options::{self, ConfigOption};
use modelgate::request::{GenerationConfig, JSON_MIME_TYPE};
use modelgate::{ConnectorRegistry, ProviderIdentifier, Request, Response};
use tokio_util::sync::CancellationToken;

use super::CmdResult;
use crate::color::{MaybePaint, FAILURE_CODE, LABEL};
use crate::utils::errors::DEFAULT_EXIT_CODE;
use crate::CallArgs;

/// Options from the configuration section of the connector serving the model,
/// followed by the command line overrides
fn connector_options(config: &Config, args: &CallArgs) -> Vec<ConfigOption> {
    let mut opts = match ProviderIdentifier::for_model(&args.model) {
        Some(id) => config.options_for(&id.to_string()),
        None => Vec::new(),
    };

    if let Some(api_key) = &args.api_key {
        opts.push(options::with_api_key(api_key.clone()));
    }

    if let Some(endpoint) = &args.endpoint {
        opts.push(options::with_endpoint(endpoint.clone()));
    }

    if let Some(timeout) = args.timeout {
        opts.push(options::with_timeout(Duration::from_secs(timeout)));
    }

    opts
}

fn build_request(args: &CallArgs) -> Request {
    let config = GenerationConfig {
        system_instruction: args.system.clone(),
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        response_mime_type: args.json.then(|| JSON_MIME_TYPE.to_string()),
        ..Default::default()
    };

    Request::new(args.model.clone())
        .with_content(Content::user(args.prompt.clone()))
        .with_config(config)
}

fn print_response(response: &Response, json: bool) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    if let Some(text) = response.text() {
        println!("{}", text);
    }

    tracing::info!(
        prompt_tokens = response.usage.prompt_tokens,
        completion_tokens = response.usage.completion_tokens,
        latency_ms = response.usage.latency_ms,
        "call finished"
    );

    Ok(())
}

pub(crate) async fn call_cmd(config: &Config, args: &CallArgs) -> CmdResult {
    let registry = ConnectorRegistry::with_builtin()?;
    let connector = registry.connect(&args.model, &connector_options(config, args))?;

    let request = build_request(args);

    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let response = connector.call(&cancel, &request).await?;

    print_response(&response, args.json)?;

    if response.is_error() {
        let code = response.error_code.as_deref().unwrap_or_default();
        let message = response.error_text().unwrap_or_default();

        eprintln!(
            "{} {} {}",
            LABEL.maybe_paint("failed:"),
            FAILURE_CODE.maybe_paint(code),
            message
        );

        std::process::exit(DEFAULT_EXIT_CODE);
    }

    Ok(())
}
