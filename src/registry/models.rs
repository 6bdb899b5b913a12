use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::pattern::PatternRegistry;
use super::populate;
use crate::error::Result;

/// A capability a model is suited for
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Profile {
    /// General conversation
    Chat,
    /// Deep reasoning
    Thinking,
    /// Tool and function calling
    Agent,
    /// Retrieval-augmented generation
    Rag,
    /// Creative writing
    Creative,
    /// Code generation
    Code,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Vendor {
    OpenAI,
    Anthropic,
    Google,
    Mistral,
    Llama,
    Custom,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CostTier {
    Basic,
    Standard,
    Premium,
}

/// Metadata describing a model's capabilities and limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The model identifier. On resolution this is the identifier which was
    /// requested, not the one the entry was registered with.
    pub id: String,
    pub profiles: Vec<Profile>,
    /// Size of the context window in tokens
    pub max_tokens: u64,
    /// Price per token, in cents
    pub cost_per_token: f64,
    pub vendor: Vendor,
    pub cost_tier: CostTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ModelInfo {
    pub fn has_profile(&self, profile: Profile) -> bool {
        self.profiles.contains(&profile)
    }
}

/// Model metadata, keyed by identifier patterns
#[derive(Default)]
pub struct ModelRegistry {
    patterns: PatternRegistry<ModelInfo>,
}

impl ModelRegistry {
    /// An empty registry
    pub fn new() -> ModelRegistry {
        ModelRegistry::default()
    }

    /// A registry holding the built-in model catalogue
    pub fn with_builtin() -> Result<ModelRegistry> {
        let registry = ModelRegistry::new();

        populate::populate(&registry)?;

        Ok(registry)
    }

    pub fn register(&self, pattern: &str, info: ModelInfo) -> Result<()> {
        self.patterns.register(pattern, info)
    }

    /// Registers `info` under every pattern in `patterns`
    pub fn register_all<I, S>(&self, info: ModelInfo, patterns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.patterns.register_all(patterns, info)
    }

    /// Finds the metadata for `model`. The returned entry carries `model` as
    /// its identifier.
    pub fn resolve(&self, model: &str) -> Result<ModelInfo> {
        let mut info = self.patterns.resolve(model)?;

        info.id = model.to_string();

        Ok(info)
    }

    pub fn has_profile(&self, model: &str, profile: Profile) -> Result<bool> {
        Ok(self.resolve(model)?.has_profile(profile))
    }

    /// Every registered model supporting `profile`
    pub fn by_profile(&self, profile: Profile) -> Vec<ModelInfo> {
        dedup(self.patterns.payloads(|info| info.has_profile(profile)))
    }

    /// Every registered model offered by `vendor`
    pub fn by_vendor(&self, vendor: Vendor) -> Vec<ModelInfo> {
        dedup(self.patterns.payloads(|info| info.vendor == vendor))
    }

    /// Every registered model, in precedence order
    pub fn models(&self) -> Vec<ModelInfo> {
        dedup(self.patterns.payloads(|_| true))
    }

    pub fn list(&self) -> Vec<String> {
        self.patterns.list()
    }

    pub fn clear(&self) {
        self.patterns.clear()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn scans(&self) -> u64 {
        self.patterns.scans()
    }
}

// The same entry is usually registered under several patterns
fn dedup(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    let mut seen = HashSet::new();

    models
        .into_iter()
        .filter(|info| seen.insert(info.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn info(id: &str, vendor: Vendor, profiles: &[Profile]) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            profiles: profiles.to_vec(),
            max_tokens: 8192,
            cost_per_token: 0.00001,
            vendor,
            cost_tier: CostTier::Standard,
            version: Some("1.0".to_string()),
        }
    }

    #[test]
    fn resolution_rewrites_the_identifier() {
        let registry = ModelRegistry::new();

        registry
            .register(
                "^gpt-4-turbo.*",
                info("gpt-4-turbo", Vendor::OpenAI, &[Profile::Chat]),
            )
            .unwrap();

        let resolved = registry.resolve("gpt-4-turbo-2024-04-09").unwrap();

        assert_eq!(resolved.id, "gpt-4-turbo-2024-04-09");
        assert_eq!(resolved.vendor, Vendor::OpenAI);
        assert_eq!(registry.scans(), 1);

        // Cached entries are rewritten as well
        let again = registry.resolve("gpt-4-turbo-2024-04-09").unwrap();
        assert_eq!(again, resolved);
        assert_eq!(registry.scans(), 1);
    }

    #[test]
    fn has_profile() {
        let registry = ModelRegistry::new();

        registry
            .register(
                "^claude-3-opus.*",
                info("claude-3-opus", Vendor::Anthropic, &[Profile::Chat, Profile::Creative]),
            )
            .unwrap();

        assert!(registry.has_profile("claude-3-opus-latest", Profile::Creative).unwrap());
        assert!(!registry.has_profile("claude-3-opus-latest", Profile::Code).unwrap());
        assert!(registry.has_profile("gemini-pro", Profile::Chat).is_err());
    }

    #[test]
    fn listings_are_deduplicated() {
        let registry = ModelRegistry::new();

        registry
            .register_all(
                info("gpt-4", Vendor::OpenAI, &[Profile::Chat, Profile::Agent]),
                ["^gpt-4$", "^gpt-4-.*"],
            )
            .unwrap();
        registry
            .register(
                "^mistral-large.*",
                info("mistral-large", Vendor::Mistral, &[Profile::Chat]),
            )
            .unwrap();

        assert_eq!(registry.len(), 3);

        let agents = registry.by_profile(Profile::Agent);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].id, "gpt-4");

        assert_eq!(registry.by_profile(Profile::Chat).len(), 2);
        assert_eq!(registry.by_vendor(Vendor::OpenAI).len(), 1);
        assert!(registry.by_vendor(Vendor::Google).is_empty());
        assert_eq!(registry.models().len(), 2);
    }

    #[test]
    fn vendors_parse_case_insensitively() {
        assert_eq!(Vendor::from_str("OpenAI").unwrap(), Vendor::OpenAI);
        assert_eq!(Vendor::from_str("ANTHROPIC").unwrap(), Vendor::Anthropic);
        assert_eq!(Profile::from_str("rag").unwrap(), Profile::Rag);
        assert_eq!(Vendor::OpenAI.to_string(), "openai");
        assert!(Vendor::from_str("acme").is_err());
    }

    #[test]
    fn clear() {
        let registry = ModelRegistry::with_builtin().unwrap();

        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }
}
