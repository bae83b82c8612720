//! Azure OpenAI adapter
//!
//! Chat Completions against a deployment endpoint. The system preamble is
//! prepended as the first message rather than sent as a separate field.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ProviderAdapter, check_capabilities, map_status, require_env_vars, tokens_with_rates,
    use_native_schema, vendor_error_message,
};
use crate::config::Model;
use crate::core::conversation::Role;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

#[derive(Debug)]
pub struct AzureOpenAiAdapter {
    model: Model,
    api_key: String,
    api_version: String,
    endpoint: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl AzureOpenAiAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let values = require_env_vars(
            "Azure",
            &[
                "AZURE_OPENAI_API_KEY",
                "AZURE_OPEN_AI_API_VERSION",
                "AZURE_OPENAI_DEPLOYMENT_NAME",
            ],
        )?;
        let [api_key, api_version, deployment]: [String; 3] =
            values.try_into().expect("three variables requested");
        Ok(Self {
            model,
            api_key,
            api_version,
            endpoint: format!("https://{deployment}.openai.azure.com"),
            client: RwLock::new(None),
        })
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
                .map_err(|e| LlmError::service_call(format!("failed to build Azure client: {e}")))?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just set").clone())
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.model.internal_model_id, self.api_version
        )
    }

    fn convert(&self, request: &LLMRequest) -> Result<Value> {
        check_capabilities(&self.model, request)?;

        let mut messages = Vec::new();
        if let Some(system) = &request.conversation.system {
            if !system.is_empty() {
                messages.push(json!({
                    "role": Role::System.as_str(),
                    "content": [{"type": "text", "text": system}],
                }));
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
        if use_native_schema(&self.model, request) {
            let schema = request.response_model.as_ref().expect("checked by gate");
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.class_name,
                    "strict": true,
                    "schema": schema.to_json_schema(),
                }
            });
        } else {
            body["response_format"] = json!({"type": "text"});
        }
        Ok(body)
    }

    fn parse_response(&self, body: &Value) -> Result<(String, ModelTokens)> {
        let output = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if output.is_empty() {
            return Err(LlmError::service_call("Azure returned an empty completion"));
        }

        let usage = &body["usage"];
        let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
        let cached = usage["prompt_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0);
        let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
        let reasoning = usage["completion_tokens_details"]["reasoning_tokens"]
            .as_u64()
            .unwrap_or(0);

        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = prompt.saturating_sub(cached);
        tokens.cached_input_tokens = cached;
        tokens.output_tokens = completion.saturating_sub(reasoning);
        tokens.reasoning_output_tokens = reasoning;
        tokens.total_tokens = usage["total_tokens"].as_u64().unwrap_or(prompt + completion);
        Ok((output, tokens))
    }
}

#[async_trait]
impl ProviderAdapter for AzureOpenAiAdapter {
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
        let client = self.client().await?;

        debug!(model = %self.model.id, "calling azure chat completions");
        let response = client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(map_status("Azure", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid Azure response JSON: {e}")))?;
        self.parse_response(&parsed)
    }
}
