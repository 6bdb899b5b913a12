//! One lookup mechanism and one request/response shape for many chat model
//! providers.
//!
//! A model is addressed by an identifier chosen at runtime. Two registries
//! resolve it: [`ModelRegistry`] finds what the model can do, and
//! [`ConnectorRegistry`] finds how to build a client for it. Connectors take
//! a canonical [`Request`], run it against the vendor API under a retry
//! policy, and hand back a normalized [`Response`].
//!
//! ```no_run
//! use modelgate::chat::Content;
//! use modelgate::options::with_api_key;
//! use modelgate::{ConnectorRegistry, Request};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> modelgate::error::Result<()> {
//! let connectors = ConnectorRegistry::with_builtin()?;
//! let connector = connectors.connect("gpt-4o", &[with_api_key("sk-...")])?;
//!
//! let request = Request::new("gpt-4o").with_content(Content::user("Hello!"));
//! let response = connector.call(&CancellationToken::new(), &request).await?;
//!
//! match response.error_text() {
//!     Some(err) => eprintln!("{err}"),
//!     None => println!("{}", response.text().unwrap_or_default()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod config;
pub mod connectors;
pub mod error;
pub mod options;
pub mod registry;
pub mod request;
pub mod response;
pub mod retry;

pub use connectors::{Connector, ConnectorRegistry, Constructor, ProviderError, ProviderIdentifier};
pub use error::{Error, Result};
pub use registry::{ModelInfo, ModelRegistry};
pub use request::Request;
pub use response::Response;
