use modelgate::registry::{ModelInfo, ModelRegistry};
use modelgate::{ConnectorRegistry, Error, ProviderIdentifier};

use super::CmdResult;
use crate::color::{MaybePaint, LABEL, MODEL_TEXT};
use crate::{warn, ListingFormat, ResolveArgs};

#[derive(serde::Serialize)]
struct Resolution {
    model: String,
    metadata: Option<ModelInfo>,
    connector: Option<ProviderIdentifier>,
}

fn resolve(model: &str) -> modelgate::Result<Resolution> {
    let metadata = match ModelRegistry::with_builtin()?.resolve(model) {
        Ok(info) => Some(info),
        Err(Error::NotFound(_)) => None,
        Err(err) => return Err(err),
    };

    let connector = match ConnectorRegistry::with_builtin()?.resolve(model) {
        Ok(_) => ProviderIdentifier::for_model(model),
        Err(Error::NotFound(_)) => None,
        Err(err) => return Err(err),
    };

    Ok(Resolution {
        model: model.to_string(),
        metadata,
        connector,
    })
}

fn print_field(name: &str, value: &str, header: bool) {
    if header {
        let label = format!("{:<10}", name);

        println!("{} {}", LABEL.maybe_paint(label.as_str()), MODEL_TEXT.maybe_paint(value));
    } else {
        println!("{}", value);
    }
}

pub(crate) fn resolve_cmd(args: &ResolveArgs) -> CmdResult {
    let resolution = resolve(&args.model)?;

    if resolution.metadata.is_none() {
        warn!("no metadata is registered for \"{}\"", resolution.model);
    }

    let header = match args.format {
        ListingFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&resolution)?);
            return Ok(());
        }
        ListingFormat::Table => true,
        ListingFormat::HeaderlessTable => false,
    };

    let connector = resolution
        .connector
        .map_or_else(|| "none".to_string(), |id| id.to_string());

    print_field("model", &resolution.model, header);
    print_field("connector", &connector, header);

    if let Some(info) = resolution.metadata {
        let profiles: Vec<String> = info.profiles.iter().map(|p| p.to_string()).collect();

        print_field("vendor", &info.vendor.to_string(), header);
        print_field("context", &info.max_tokens.to_string(), header);
        print_field("tier", &info.cost_tier.to_string(), header);
        print_field("profiles", &profiles.join(","), header);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use modelgate::registry::Vendor;

    use super::*;

    #[test]
    fn dated_model_resolves_to_catalogue_entry() {
        let resolution = resolve("claude-3-opus-20240229").unwrap();

        let info = resolution.metadata.unwrap();
        assert_eq!(info.id, "claude-3-opus-20240229");
        assert_eq!(info.vendor, Vendor::Anthropic);
        assert_eq!(resolution.connector, Some(ProviderIdentifier::Anthropic));
    }

    #[test]
    fn local_model_has_connector_but_no_metadata() {
        let resolution = resolve("ollama/phi3").unwrap();

        assert!(resolution.metadata.is_none());
        assert_eq!(resolution.connector, Some(ProviderIdentifier::Ollama));
    }

    #[test]
    fn unknown_model_has_neither() {
        let resolution = resolve("no-such-model").unwrap();

        assert!(resolution.metadata.is_none());
        assert!(resolution.connector.is_none());
    }
}
