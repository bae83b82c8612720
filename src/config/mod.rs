//! Model catalog and registry
//!
//! Declarative YAML catalog of providers and models, loaded once at
//! startup into a process-wide registry.

mod catalog;
mod registry;

pub use catalog::{Model, ModelCapabilities, ModelPrice, ModelProvider};
pub use registry::ModelRegistry;
