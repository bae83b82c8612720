//! Provider adapters
//!
//! One adapter per vendor, all behind a single trait. An adapter makes
//! exactly one vendor call per `service_call`: throttling surfaces as the
//! throttling kind (never retried here), translation problems as the
//! conversion kind, everything else as service-call. Retrying belongs to
//! the dispatch core.

mod aws;
mod azure;
mod google;
mod mock;
mod openai;
mod openrouter;
mod sigv4;
mod together;

pub use aws::AwsBedrockAdapter;
pub use azure::AzureOpenAiAdapter;
pub use google::GoogleAdapter;
pub use mock::MockAdapter;
pub use openai::OpenAiAdapter;
pub use openrouter::OpenRouterAdapter;
pub use together::TogetherAdapter;

use async_trait::async_trait;

use crate::config::Model;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

/// Contract between the dispatch core and a vendor
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// The catalog entry this adapter is bound to
    fn model(&self) -> &Model;

    /// Acquire the vendor client; idempotent and safe to call repeatedly
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Release the vendor client; idempotent
    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Make exactly one vendor call and return the raw text plus token
    /// counters
    async fn service_call(&self, request: &LLMRequest) -> Result<(String, ModelTokens)>;
}

/// Build the adapter for a model's provider.
///
/// The dispatch table is closed; unknown providers are a configuration
/// error. Credential checks run here, at construction, not at call time.
pub fn create_adapter(model: &Model) -> Result<Box<dyn ProviderAdapter>> {
    match model.provider.name.to_uppercase().as_str() {
        "AWS" => Ok(Box::new(AwsBedrockAdapter::new(model.clone())?)),
        "AZURE" => Ok(Box::new(AzureOpenAiAdapter::new(model.clone())?)),
        "OPENAI" => Ok(Box::new(OpenAiAdapter::new(model.clone())?)),
        "GOOGLE" => Ok(Box::new(GoogleAdapter::new(model.clone())?)),
        "OPENROUTER" => Ok(Box::new(OpenRouterAdapter::new(model.clone())?)),
        "TOGETHER" => Ok(Box::new(TogetherAdapter::new(model.clone())?)),
        "MOCK" => Ok(Box::new(MockAdapter::new(model.clone()))),
        other => Err(LlmError::config(format!("unsupported provider: {other}"))),
    }
}

/// Reject requests the bound model cannot serve, before any network call.
///
/// Attachments are only valid on user messages, and only on models that
/// advertise the matching capability.
pub(crate) fn check_capabilities(model: &Model, request: &LLMRequest) -> Result<()> {
    for message in &request.conversation.messages {
        if message.has_attachments() && message.role != crate::core::conversation::Role::User {
            return Err(LlmError::conversion(format!(
                "attachments are only allowed on user messages, found them on a {} message",
                message.role
            )));
        }
        if !message.images.is_empty() && !model.capabilities.image_support {
            return Err(LlmError::conversion(format!(
                "model '{}' does not support image inputs",
                model.id
            )));
        }
        if !message.documents.is_empty() && !model.capabilities.document_support {
            return Err(LlmError::conversion(format!(
                "model '{}' does not support document inputs",
                model.id
            )));
        }
    }
    Ok(())
}

/// Whether this request may take the vendor-native JSON-schema path.
/// Anything else falls back to the XML-prompt path.
pub(crate) fn use_native_schema(model: &Model, request: &LLMRequest) -> bool {
    model.capabilities.structured_output
        && request
            .response_model
            .as_ref()
            .is_some_and(|schema| schema.native)
}

/// Seed a token record with the model's current price rates
pub(crate) fn tokens_with_rates(model: &Model) -> ModelTokens {
    ModelTokens {
        input_price_per_1m_tokens: model.price.input_price_per_1m_tokens,
        cached_input_price_per_1m_tokens: model.price.cached_input_price_per_1m_tokens,
        output_price_per_1m_tokens: model.price.output_price_per_1m_tokens,
        reasoning_output_price_per_1m_tokens: model.reasoning_output_price_per_1m_tokens(),
        ..Default::default()
    }
}

/// Read a set of required environment variables, reporting every missing
/// one in a single credentials error
pub(crate) fn require_env_vars(provider: &str, names: &[&str]) -> Result<Vec<String>> {
    let mut values = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => values.push(value),
            _ => missing.push(*name),
        }
    }
    if missing.is_empty() {
        Ok(values)
    } else {
        Err(LlmError::credentials(format!(
            "missing required environment variables for {provider}: {}",
            missing.join(", ")
        )))
    }
}

/// Pull a human message out of a vendor error body, falling back to the
/// raw body text
pub(crate) fn vendor_error_message(body: &str) -> String {
    fn lookup<'v>(value: &'v serde_json::Value, path: &[&str]) -> Option<&'v str> {
        let mut cursor = value;
        for key in path {
            cursor = cursor.get(key)?;
        }
        cursor.as_str()
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for path in [&["error", "message"][..], &["message"][..], &["detail"][..]] {
            if let Some(message) = lookup(&value, path) {
                return message.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail".to_string()
    } else {
        trimmed.chars().take(500).collect()
    }
}

/// Map a vendor HTTP status to the error taxonomy
pub(crate) fn map_status(provider: &str, status: u16, message: &str) -> LlmError {
    match status {
        400 | 422 => LlmError::service_call(format!(
            "{provider} rejected the request (status {status}): {message}"
        )),
        401 => LlmError::credentials(format!("{provider} authentication failed: {message}")),
        403 => LlmError::service_call(format!("{provider} access denied: {message}")),
        404 => LlmError::model_not_found(format!("{provider} model not found: {message}")),
        408 | 504 => LlmError::service_call(format!(
            "{provider} request timed out (status {status}): {message}"
        )),
        429 => LlmError::throttling(format!("{provider} is throttling requests: {message}")),
        _ => LlmError::service_call(format!("{provider} error (status {status}): {message}")),
    }
}
