//! # llmserv-rs
//!
//! A multi-provider LLM gateway: one long-running HTTP service that
//! accepts chat requests, dispatches them to upstream model vendors over
//! their native APIs, and returns a normalized response, optionally
//! parsed into a caller-declared structured schema.
//!
//! The pipeline for one call: the registry resolves `PROVIDER/name` to a
//! catalog entry and its adapter; the adapter translates the neutral
//! conversation into the vendor wire format; throttling retries with
//! pure exponential backoff; structured output is parsed through a
//! malformation-tolerant XML-like engine; and a per-call metric record
//! lands in a bounded, disk-archived log on a fire-and-forget path.
//!
//! ```rust,no_run
//! use llmserv_rs::config::ModelRegistry;
//! use llmserv_rs::core::conversation::Conversation;
//! use llmserv_rs::core::dispatch::dispatch;
//! use llmserv_rs::core::providers::create_adapter;
//! use llmserv_rs::core::types::LLMRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModelRegistry::from_yaml_file("config/models.yaml")?;
//!     let model = registry.get_model("MOCK/mock")?;
//!     let adapter = create_adapter(&model)?;
//!
//!     let request = LLMRequest::new(Conversation::from_prompt("Hello there"));
//!     let response = dispatch(adapter.as_ref(), &request).await?;
//!     println!("{:?}", response.raw_output);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod metrics;
pub mod server;
pub mod structured;
pub mod utils;

pub use crate::config::{Model, ModelProvider, ModelRegistry};
pub use crate::core::conversation::{Conversation, Message, Role};
pub use crate::core::dispatch::{dispatch, retry_with_backoff};
pub use crate::core::providers::{ProviderAdapter, create_adapter};
pub use crate::core::types::{LLMRequest, LLMResponse, LlmOutput, ModelTokens, TokenTracker};
pub use crate::metrics::{LogManager, LogStats, ModelMetrics};
pub use crate::structured::{SchemaNode, StructuredResponse};
pub use crate::utils::error::{LlmError, Result};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
