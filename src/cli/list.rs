use modelgate::registry::{ModelInfo, ModelRegistry};
use modelgate::ConnectorRegistry;
use table::Table;
mod table;

use super::CmdResult;
use crate::{ListArgs, ListModelArgs, ListObject, ListingFormat};

trait IntoTable {
    fn into_table(self) -> Table;
}

#[derive(serde::Serialize)]
struct RegisteredPattern {
    pattern: String,
    registry: &'static str,
}

impl IntoTable for Vec<RegisteredPattern> {
    fn into_table(self) -> Table {
        let mut tab = Table::with_header(["PATTERN", "REGISTRY"]);

        for entry in self {
            tab.add_row(vec![entry.pattern, entry.registry.to_string()]);
        }

        tab
    }
}

impl IntoTable for Vec<ModelInfo> {
    fn into_table(self) -> Table {
        let mut tab = Table::with_header(["MODEL", "VENDOR", "CONTEXT", "TIER", "PROFILES"]);

        for model in self {
            let profiles: Vec<String> = model.profiles.iter().map(|p| p.to_string()).collect();

            tab.add_row(vec![
                model.id,
                model.vendor.to_string(),
                model.max_tokens.to_string(),
                model.cost_tier.to_string(),
                profiles.join(","),
            ]);
        }

        tab
    }
}

fn registered_patterns() -> modelgate::Result<Vec<RegisteredPattern>> {
    let models = ModelRegistry::with_builtin()?;
    let connectors = ConnectorRegistry::with_builtin()?;

    let tagged = |registry: &'static str| {
        move |pattern: String| RegisteredPattern { pattern, registry }
    };

    Ok(models
        .list()
        .into_iter()
        .map(tagged("model"))
        .chain(connectors.list().into_iter().map(tagged("connector")))
        .collect())
}

fn catalogue_models(args: &ListModelArgs) -> modelgate::Result<Vec<ModelInfo>> {
    let registry = ModelRegistry::with_builtin()?;

    let mut models = registry.models();

    if let Some(profile) = args.profile {
        models.retain(|m| m.has_profile(profile));
    }

    if let Some(vendor) = args.vendor {
        models.retain(|m| m.vendor == vendor);
    }

    Ok(models)
}

fn format_output<O: IntoTable + serde::Serialize>(object: O, format: ListingFormat) -> CmdResult {
    match format {
        ListingFormat::Json => {
            let output = serde_json::to_string_pretty(&object)?;

            println!("{}", output);
        }
        ListingFormat::Table => {
            print!("{}", object.into_table());
        }
        ListingFormat::HeaderlessTable => {
            let mut tab = object.into_table();

            tab.print_header(false);

            print!("{}", tab);
        }
    }

    Ok(())
}

pub(crate) fn list_cmd(args: &ListArgs) -> CmdResult {
    match &args.object {
        ListObject::Patterns => format_output(registered_patterns()?, args.format),
        ListObject::Models(model_args) => format_output(catalogue_models(model_args)?, args.format),
    }
}
