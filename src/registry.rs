//! Resolution of arbitrary model identifiers.
//!
//! Callers address models by identifier ("gpt-4-turbo-2024-04-09",
//! "claude-3-sonnet-20240229", ...) and never enumerate them up front. Instead,
//! the code that knows about a family of models registers regular expressions
//! describing the identifiers it handles. A `PatternRegistry` maps those
//! patterns to a payload and memoizes resolutions; it is used twice:
//!
//! ```text
//! ModelRegistry      : pattern -> ModelInfo     (capabilities and limits)
//! ConnectorRegistry  : pattern -> Constructor   (builds a client for the model)
//! ```
//!
//! The two registries are independent. A model can have metadata without a
//! connector and the other way around.

pub mod models;
pub mod pattern;
pub mod populate;

pub use models::{CostTier, ModelInfo, ModelRegistry, Profile, Vendor};
pub use pattern::PatternRegistry;
