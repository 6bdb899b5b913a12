use lazy_static::lazy_static;

use super::models::{CostTier, ModelInfo, ModelRegistry, Profile, Vendor};
use crate::error::Result;

use Profile::*;

struct CatalogueEntry {
    info: ModelInfo,
    patterns: &'static [&'static str],
}

fn entry(
    id: &str,
    vendor: Vendor,
    profiles: &[Profile],
    max_tokens: u64,
    cost_per_token: f64,
    cost_tier: CostTier,
    patterns: &'static [&'static str],
) -> CatalogueEntry {
    CatalogueEntry {
        info: ModelInfo {
            id: id.to_string(),
            profiles: profiles.to_vec(),
            max_tokens,
            cost_per_token,
            vendor,
            cost_tier,
            version: Some("1.0".to_string()),
        },
        patterns,
    }
}

lazy_static! {
    // None of the vendors publish context lengths or prices through their APIs,
    // so this list needs to be updated whenever a model is added or changes.
    //
    // Entries are registered in order. Where patterns overlap (gpt-4-turbo and
    // gpt-4-*), the more specific entry must come first.
    static ref CATALOGUE: Vec<CatalogueEntry> = vec![
        entry("gpt-4o", Vendor::OpenAI, &[Chat, Thinking, Agent, Rag, Code], 128000, 0.0005, CostTier::Premium, &["^gpt-4o.*"]),
        entry("gpt-4-turbo", Vendor::OpenAI, &[Chat, Thinking, Agent, Rag], 128000, 0.00001, CostTier::Premium, &["^gpt-4-turbo.*"]),
        entry("gpt-4", Vendor::OpenAI, &[Chat, Thinking, Agent], 8192, 0.00003, CostTier::Premium, &["^gpt-4$", "^gpt-4-.*"]),
        entry("gpt-3.5-turbo", Vendor::OpenAI, &[Chat, Agent], 16385, 0.000002, CostTier::Standard, &[r"^gpt-3\.5-turbo.*"]),
        entry("claude-3-opus", Vendor::Anthropic, &[Chat, Thinking, Rag, Creative], 200000, 0.00002, CostTier::Premium, &["^claude-3-opus.*"]),
        entry("claude-3-sonnet", Vendor::Anthropic, &[Chat, Thinking, Rag], 200000, 0.00001, CostTier::Standard, &["^claude-3-sonnet.*"]),
        entry("claude-3-haiku", Vendor::Anthropic, &[Chat, Rag], 200000, 0.0000025, CostTier::Basic, &["^claude-3-haiku.*"]),
        entry("claude-3.5-sonnet", Vendor::Anthropic, &[Chat, Thinking, Agent, Rag, Code], 200000, 0.00001, CostTier::Standard, &[r"^claude-3\.5-sonnet.*", "^claude-3-5-sonnet.*"]),
        entry("gemini-pro", Vendor::Google, &[Chat, Agent, Rag], 32768, 0.000005, CostTier::Standard, &["^gemini-pro.*"]),
        entry("mistral-large", Vendor::Mistral, &[Chat, Thinking], 32768, 0.000008, CostTier::Standard, &["^mistral-large.*"]),
    ];
}

/// Registers the built-in model catalogue
pub fn populate(registry: &ModelRegistry) -> Result<()> {
    for entry in CATALOGUE.iter() {
        registry.register_all(entry.info.clone(), entry.patterns)?;
    }

    tracing::debug!(patterns = registry.len(), "registered built-in models");

    Ok(())
}
