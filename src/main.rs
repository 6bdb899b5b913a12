mod cli;
mod color;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{call::call_cmd, list::list_cmd, resolve::resolve_cmd};
use modelgate::config::{read_config, Config};
use modelgate::registry::{Profile, Vendor};
use tracing_subscriber::EnvFilter;

#[derive(
    Parser, Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(
    about = "Resolve and call chat models across providers",
    version = "0.0.1"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Read the configuration from this file instead of the default locations
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered patterns or models
    List(ListArgs),
    /// Show the metadata and connector for a model
    Resolve(ResolveArgs),
    /// Send a single prompt to a model
    Call(CallArgs),
}

/// Possible listings
#[derive(Subcommand)]
pub(crate) enum ListObject {
    /// Patterns registered for metadata and connectors
    Patterns,
    /// Models in the built-in catalogue
    Models(ListModelArgs),
}

/// Output formats
#[derive(
    Parser, ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

#[derive(Parser, Default)]
pub(crate) struct ListModelArgs {
    /// Limit listing to models with the specified profile
    #[arg(short, long)]
    profile: Option<Profile>,
    /// Limit listing to models from the specified vendor
    #[arg(short, long)]
    vendor: Option<Vendor>,
}

#[derive(Parser)]
pub(crate) struct ResolveArgs {
    /// Output the result with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// The model identifier
    model: String,
}

#[derive(Parser)]
pub(crate) struct CallArgs {
    /// The model identifier
    #[arg(short, long)]
    model: String,
    /// API key, overriding the configuration and environment
    #[arg(long)]
    api_key: Option<String>,
    /// Endpoint, overriding the configuration
    #[arg(long)]
    endpoint: Option<String>,
    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// System instruction
    #[arg(short, long)]
    system: Option<String>,
    /// Maximum number of tokens to generate
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(short, long)]
    temperature: Option<f64>,
    /// Print the full normalized response as JSON
    #[arg(long)]
    json: bool,
    /// The prompt
    prompt: String,
}

fn init_logging(config: &Config) {
    let level = config.logging.level.as_deref().unwrap_or("warn");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|err| {
            warn!("invalid log level \"{}\": {}", level, err);
            EnvFilter::new("warn")
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    color::configure_color(cli.color.resolve());

    let config = match read_config(cli.config) {
        Ok(config) => config,
        Err(err) => die!("{}", err),
    };

    init_logging(&config);

    for key in &config.extraneous_keys {
        warn!("config contains extraneous key \"{}\", ignoring", key);
    }

    let result = match &cli.command {
        Commands::List(args) => list_cmd(args),
        Commands::Resolve(args) => resolve_cmd(args),
        Commands::Call(args) => call_cmd(&config, args).await,
    };

    if let Err(err) = result {
        die!("{}", err);
    }
}
