//! Chat request model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::conversation::Conversation;
use crate::structured::StructuredResponse;
use crate::utils::error::{LlmError, Result};

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_retries() -> u32 {
    5
}

/// Kind of work requested; this core only serves chat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[default]
    Chat,
}

/// A provider-neutral chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LLMRequest {
    #[serde(default = "generate_id")]
    pub id: String,
    #[serde(default)]
    pub request_type: RequestType,
    pub conversation: Conversation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_model: Option<StructuredResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u64>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Optional deadline for the whole call, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

impl LLMRequest {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            id: generate_id(),
            request_type: RequestType::Chat,
            conversation,
            response_model: None,
            max_completion_tokens: None,
            temperature: default_temperature(),
            top_p: None,
            max_retries: default_max_retries(),
            timeout: None,
        }
    }

    pub fn with_response_model(mut self, response_model: StructuredResponse) -> Self {
        self.response_model = Some(response_model);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_completion_tokens(mut self, max: u64) -> Self {
        self.max_completion_tokens = Some(max);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Enforce request invariants
    pub fn validate(&self) -> Result<()> {
        if self.temperature < 0.0 {
            return Err(LlmError::conversion(format!(
                "temperature must be >= 0, got {}",
                self.temperature
            )));
        }
        if let Some(top_p) = self.top_p {
            if !(top_p > 0.0 && top_p <= 1.0) {
                return Err(LlmError::conversion(format!(
                    "top_p must be in (0, 1], got {top_p}"
                )));
            }
        }
        if self.max_completion_tokens == Some(0) {
            return Err(LlmError::conversion("max_completion_tokens must be > 0"));
        }
        Ok(())
    }
}
