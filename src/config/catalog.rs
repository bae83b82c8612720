//! Catalog file model
//!
//! The catalog is a YAML file with two sections: `PROVIDERS`, a map of
//! provider names to opaque configuration, and `MODELS`, a map of
//! `PROVIDER/name` keys to model entries. Absent price keys default to
//! zero, absent capability flags to false.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provider record: a name plus an opaque configuration map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelProvider {
    pub name: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Capability flags a model advertises
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub image_support: bool,
    #[serde(default)]
    pub document_support: bool,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

/// Per-million pricing rates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    #[serde(default)]
    pub input_price_per_1m_tokens: f64,
    #[serde(default)]
    pub cached_input_price_per_1m_tokens: f64,
    #[serde(default)]
    pub output_price_per_1m_tokens: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_output_price_per_1m_tokens: Option<f64>,
}

/// A catalog entry: one model offered by one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// `PROVIDER/name` key used for routing and metrics partitioning
    pub id: String,
    /// Vendor-side model identifier
    pub internal_model_id: String,
    pub provider: ModelProvider,
    /// Context window size
    pub max_tokens: u64,
    pub max_output_tokens: u64,
    #[serde(default)]
    pub fixed_temperature: bool,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub price: ModelPrice,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl Model {
    /// Model name (the part after the slash)
    pub fn name(&self) -> &str {
        self.id.split('/').nth(1).unwrap_or(&self.id)
    }

    pub fn provider_name(&self) -> &str {
        &self.provider.name
    }

    /// Reasoning-output rate, falling back to the plain output rate
    pub fn reasoning_output_price_per_1m_tokens(&self) -> f64 {
        self.price
            .reasoning_output_price_per_1m_tokens
            .unwrap_or(self.price.output_price_per_1m_tokens)
    }
}

/// Raw YAML shape of one model entry
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelEntry {
    pub internal_model_id: String,
    pub max_tokens: u64,
    pub max_output_tokens: u64,
    #[serde(default)]
    pub fixed_temperature: bool,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub price: ModelPrice,
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Raw YAML shape of one provider entry
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProviderEntry {
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

/// Top-level catalog file
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CatalogFile {
    #[serde(rename = "PROVIDERS", default)]
    pub providers: HashMap<String, ProviderEntry>,
    #[serde(rename = "MODELS", default)]
    pub models: HashMap<String, ModelEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_accessors() {
        let model = Model {
            id: "OPENAI/gpt-4.1-mini".into(),
            internal_model_id: "gpt-4.1-mini-2025".into(),
            provider: ModelProvider {
                name: "OPENAI".into(),
                config: HashMap::new(),
            },
            max_tokens: 128_000,
            max_output_tokens: 16_384,
            fixed_temperature: false,
            capabilities: ModelCapabilities::default(),
            price: ModelPrice {
                output_price_per_1m_tokens: 8.0,
                ..Default::default()
            },
            config: HashMap::new(),
        };
        assert_eq!(model.name(), "gpt-4.1-mini");
        assert_eq!(model.provider_name(), "OPENAI");
        assert_eq!(model.reasoning_output_price_per_1m_tokens(), 8.0);
    }
}
