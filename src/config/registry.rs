//! Model registry
//!
//! An immutable-after-load view of the catalog, answering lookups by
//! `PROVIDER/name` or bare model name. The boundary constructs one
//! registry at startup and injects it; `add_model` mutates under a short
//! write-lock critical section.

use std::path::Path;

use parking_lot::RwLock;
use tracing::info;

use super::catalog::{CatalogFile, Model, ModelProvider};
use crate::utils::error::{LlmError, Result};

#[derive(Debug)]
struct RegistryState {
    providers: Vec<ModelProvider>,
    models: Vec<Model>,
}

/// The catalog view shared across the gateway
#[derive(Debug)]
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
}

impl ModelRegistry {
    /// Build an empty registry (useful for tests and programmatic setup)
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(RegistryState {
                providers: Vec::new(),
                models: Vec::new(),
            }),
        }
    }

    /// Load the catalog from a YAML file on disk
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LlmError::config(format!("models file not found at '{}': {e}", path.display()))
        })?;
        let registry = Self::from_yaml_str(&raw)?;
        info!(
            models = registry.model_count(),
            providers = registry.list_providers().len(),
            "loaded model catalog from {}",
            path.display()
        );
        Ok(registry)
    }

    /// Load the catalog from YAML text
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let catalog: CatalogFile = serde_yaml::from_str(raw)
            .map_err(|e| LlmError::config(format!("invalid catalog YAML: {e}")))?;

        let mut providers: Vec<ModelProvider> = Vec::new();
        let mut models = Vec::new();

        let mut model_ids: Vec<&String> = catalog.models.keys().collect();
        model_ids.sort();

        for model_id in model_ids {
            let entry = &catalog.models[model_id];
            Self::check_model_id(model_id)?;
            let provider_name = model_id.split('/').next().expect("validated id");

            let provider = if let Some(existing) =
                providers.iter().find(|p| p.name == provider_name)
            {
                existing.clone()
            } else {
                let provider_entry = catalog.providers.get(provider_name).ok_or_else(|| {
                    LlmError::config(format!(
                        "provider '{provider_name}' referenced in model '{model_id}' but not defined in PROVIDERS"
                    ))
                })?;
                let provider = ModelProvider {
                    name: provider_name.to_string(),
                    config: provider_entry.config.clone(),
                };
                providers.push(provider.clone());
                provider
            };

            models.push(Model {
                id: model_id.clone(),
                internal_model_id: entry.internal_model_id.clone(),
                provider,
                max_tokens: entry.max_tokens,
                max_output_tokens: entry.max_output_tokens,
                fixed_temperature: entry.fixed_temperature,
                capabilities: entry.capabilities.clone(),
                price: entry.price.clone(),
                config: entry.config.clone(),
            });
        }

        Ok(Self {
            state: RwLock::new(RegistryState { providers, models }),
        })
    }

    /// Validate a `PROVIDER/name` id: exactly one slash, both sides
    /// non-empty.
    pub fn check_model_id(model_id: &str) -> Result<()> {
        let model_id = model_id.trim();
        let parts: Vec<&str> = model_id.split('/').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(LlmError::config(format!("invalid model id: '{model_id}'")));
        }
        Ok(())
    }

    /// Look up a model by `PROVIDER/name` (provider case-insensitive,
    /// name exact) or by bare name (first match).
    pub fn get_model(&self, model_id: &str) -> Result<Model> {
        let model_id = model_id.trim();
        let state = self.state.read();

        if model_id.contains('/') {
            Self::check_model_id(model_id)?;
            let (provider_name, model_name) =
                model_id.split_once('/').expect("validated id");
            state
                .models
                .iter()
                .find(|m| {
                    m.provider.name.eq_ignore_ascii_case(provider_name) && m.name() == model_name
                })
                .cloned()
                .ok_or_else(|| LlmError::model_not_found(format!("no model found for id '{model_id}'")))
        } else {
            state
                .models
                .iter()
                .find(|m| m.name() == model_id)
                .cloned()
                .ok_or_else(|| LlmError::model_not_found(format!("no model found for id '{model_id}'")))
        }
    }

    /// Insert or replace a model by id, reconciling its provider record
    pub fn add_model(&self, model: Model) -> Result<()> {
        Self::check_model_id(&model.id)?;
        let mut state = self.state.write();

        if let Some(existing) = state.models.iter_mut().find(|m| m.id == model.id) {
            *existing = model.clone();
        } else {
            state.models.push(model.clone());
        }
        if let Some(existing) = state
            .providers
            .iter_mut()
            .find(|p| p.name == model.provider.name)
        {
            *existing = model.provider;
        } else {
            state.providers.push(model.provider);
        }
        Ok(())
    }

    pub fn list_providers(&self) -> Vec<ModelProvider> {
        self.state.read().providers.clone()
    }

    /// List models, optionally filtered by provider name
    /// (case-insensitive)
    pub fn list_models(&self, provider: Option<&str>) -> Vec<Model> {
        let state = self.state.read();
        match provider {
            None => state.models.clone(),
            Some(name) => state
                .models
                .iter()
                .filter(|m| m.provider.name.eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
        }
    }

    pub fn model_count(&self) -> usize {
        self.state.read().models.len()
    }
}
