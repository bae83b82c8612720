//! Together AI adapter
//!
//! OpenAI-compatible chat completions against `api.together.xyz`.
//! Together reports neither cached-input nor reasoning tokens, so those
//! counters stay zero.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ProviderAdapter, check_capabilities, map_status, require_env_vars, tokens_with_rates,
    vendor_error_message,
};
use crate::config::Model;
use crate::core::conversation::Role;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

const BASE_URL: &str = "https://api.together.xyz/v1";

#[derive(Debug)]
pub struct TogetherAdapter {
    model: Model,
    api_key: String,
    base_url: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl TogetherAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let values = require_env_vars("Together", &["TOGETHER_API_KEY"])?;
        let [api_key]: [String; 1] = values.try_into().expect("one variable requested");
        Ok(Self {
            model,
            api_key,
            base_url: BASE_URL.to_string(),
            client: RwLock::new(None),
        })
    }

    #[cfg(test)]
    fn for_tests(model: Model, base_url: String) -> Self {
        Self {
            model,
            api_key: "test-key".into(),
            base_url,
            client: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<reqwest::Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }
        let mut guard = self.client.write().await;
        if guard.is_none() {
            let client = reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .map_err(|e| {
                    LlmError::service_call(format!("failed to build Together client: {e}"))
                })?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just set").clone())
    }

    fn convert(&self, request: &LLMRequest) -> Result<Value> {
        check_capabilities(&self.model, request)?;

        let mut messages = Vec::new();
        if let Some(system) = &request.conversation.system {
            if !system.is_empty() {
                messages.push(json!({"role": Role::System.as_str(), "content": system}));
            }
        }
        for message in &request.conversation.messages {
            let mut content = Vec::new();
            if let Some(text) = &message.text {
                content.push(json!({"type": "text", "text": text}));
            }
            for image in &message.images {
                content.push(json!({
                    "type": "image_url",
                    "image_url": {
                        "url": format!("data:{};base64,{}", image.format.mime(), image.as_base64()),
                        "detail": "high",
                    },
                }));
            }
            messages.push(json!({"role": message.role.as_str(), "content": content}));
        }

        let mut body = json!({
            "model": self.model.internal_model_id,
            "messages": messages,
            "max_tokens": request
                .max_completion_tokens
                .unwrap_or(self.model.max_output_tokens),
        });
        if !self.model.fixed_temperature {
            body["temperature"] = json!(request.temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        Ok(body)
    }

    fn parse_response(&self, body: &Value, max_tokens: u64) -> Result<(String, ModelTokens)> {
        let usage = &body["usage"];
        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0);
        tokens.output_tokens = usage["completion_tokens"].as_u64().unwrap_or(0);
        tokens.total_tokens = usage["total_tokens"]
            .as_u64()
            .unwrap_or(tokens.input_tokens + tokens.output_tokens);

        let output = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if output.is_empty() {
            return Err(LlmError::service_call(format!(
                "Together returned an empty output (max_tokens={max_tokens}, output_tokens={}, total_tokens={})",
                tokens.output_tokens, tokens.total_tokens
            )));
        }
        Ok((output, tokens))
    }
}

#[async_trait]
impl ProviderAdapter for TogetherAdapter {
    fn model(&self) -> &Model {
        &self.model
    }

    async fn start(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    async fn stop(&self) -> Result<()> {
        self.client.write().await.take();
        Ok(())
    }

    async fn service_call(&self, request: &LLMRequest) -> Result<(String, ModelTokens)> {
        let body = self.convert(request)?;
        let max_tokens = body["max_tokens"].as_u64().unwrap_or(0);
        let client = self.client().await?;

        debug!(model = %self.model.id, "calling together chat completions");
        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(map_status("Together", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid Together response JSON: {e}")))?;
        self.parse_response(&parsed, max_tokens)
    }
}
