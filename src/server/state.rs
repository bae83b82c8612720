//! Shared application state
//!
//! The boundary owns the registry, the per-model adapter singletons and
//! the metrics recorder, and injects them into the handlers. Adapters
//! are built once at startup; a model whose credentials are missing is
//! logged and skipped rather than failing the whole process.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::ModelRegistry;
use crate::core::providers::{ProviderAdapter, create_adapter};
use crate::metrics::LogManager;
use crate::utils::time::unix_now;

pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub log_manager: Arc<LogManager>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    pub start_time: f64,
    pub chat_request_count: AtomicU64,
    pub model_usage: Mutex<HashMap<String, u64>>,
}

impl AppState {
    /// Build the adapter map for every catalog model
    pub fn build(registry: Arc<ModelRegistry>, log_manager: Arc<LogManager>) -> Self {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for model in registry.list_models(None) {
            match create_adapter(&model) {
                Ok(adapter) => {
                    adapters.insert(model.id.clone(), Arc::from(adapter));
                }
                Err(e) => {
                    error!(model = %model.id, "failed to set up provider adapter: {e}");
                }
            }
        }
        info!(adapters = adapters.len(), "provider adapters initialized");

        Self {
            registry,
            log_manager,
            adapters,
            start_time: unix_now(),
            chat_request_count: AtomicU64::new(0),
            model_usage: Mutex::new(HashMap::new()),
        }
    }

    /// Find the adapter for a `PROVIDER/name` key; the provider part is
    /// case-insensitive like registry lookups.
    pub fn adapter(&self, model_key: &str) -> Option<Arc<dyn ProviderAdapter>> {
        if let Some(adapter) = self.adapters.get(model_key) {
            return Some(adapter.clone());
        }
        let (provider, name) = model_key.split_once('/')?;
        self.adapters
            .iter()
            .find(|(key, _)| {
                key.split_once('/').is_some_and(|(key_provider, key_name)| {
                    key_provider.eq_ignore_ascii_case(provider) && key_name == name
                })
            })
            .map(|(_, adapter)| adapter.clone())
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
PROVIDERS:
  MOCK: {}
MODELS:
  MOCK/mock:
    internal_model_id: mock
    max_tokens: 10000
    max_output_tokens: 10000
"#;

    #[test]
    fn builds_adapters_for_catalog_models() {
        let registry = Arc::new(ModelRegistry::from_yaml_str(CATALOG).unwrap());
        let log_manager = Arc::new(LogManager::new(
            std::env::temp_dir().join("llmserv-state-test"),
            10,
            2,
        ));
        let state = AppState::build(registry, log_manager);
        assert_eq!(state.adapter_count(), 1);
        assert!(state.adapter("MOCK/mock").is_some());
        assert!(state.adapter("mock/mock").is_some());
        assert!(state.adapter("MOCK/other").is_none());
        assert!(state.adapter("no-slash").is_none());
    }
}
