//! OpenAI adapter
//!
//! Uses the Responses API. When the request carries a native-flagged
//! schema and the model advertises structured output, the call takes the
//! strict JSON-schema path; otherwise the schema travels inside the
//! prompt and the raw text is returned unchanged.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ProviderAdapter, check_capabilities, map_status, require_env_vars, tokens_with_rates,
    use_native_schema, vendor_error_message,
};
use crate::config::Model;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

const BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug)]
pub struct OpenAiAdapter {
    model: Model,
    api_key: String,
    organization: String,
    project: String,
    base_url: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl OpenAiAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let values = require_env_vars(
            "OpenAI",
            &["OPENAI_API_KEY", "OPENAI_ORGANIZATION", "OPENAI_PROJECT"],
        )?;
        let [api_key, organization, project]: [String; 3] =
            values.try_into().expect("three variables requested");
        Ok(Self {
            model,
            api_key,
            organization,
            project,
            base_url: BASE_URL.to_string(),
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
                .map_err(|e| LlmError::service_call(format!("failed to build OpenAI client: {e}")))?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just set").clone())
    }

    /// Translate the neutral request into a Responses API payload
    fn convert(&self, request: &LLMRequest) -> Result<Value> {
        check_capabilities(&self.model, request)?;

        let mut input = Vec::new();
        for message in &request.conversation.messages {
            let mut content = Vec::new();
            if let Some(text) = &message.text {
                content.push(json!({"type": "input_text", "text": text}));
            }
            for image in &message.images {
                content.push(json!({
                    "type": "input_image",
                    "image_url": format!("data:{};base64,{}", image.format.mime(), image.as_base64()),
                }));
            }
            input.push(json!({"role": message.role.as_str(), "content": content}));
        }

        let mut body = json!({
            "model": self.model.internal_model_id,
            "input": input,
            "max_output_tokens": request
                .max_completion_tokens
                .unwrap_or(self.model.max_output_tokens),
        });
        if !self.model.fixed_temperature {
            body["temperature"] = json!(request.temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(system) = &request.conversation.system {
            if !system.is_empty() {
                body["instructions"] = json!(system);
            }
        }

        if use_native_schema(&self.model, request) {
            let schema = request.response_model.as_ref().expect("checked by gate");
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": schema.class_name,
                    "strict": true,
                    "schema": schema.to_json_schema(),
                }
            });
        } else {
            body["text"] = json!({"format": {"type": "text"}});
        }
        Ok(body)
    }

    fn parse_response(&self, body: &Value, max_output_tokens: u64) -> Result<(String, ModelTokens)> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(LlmError::service_call(format!(
                "OpenAI service error {}: {}",
                error["code"].as_str().unwrap_or("unknown"),
                error["message"].as_str().unwrap_or("no message")
            )));
        }

        // Terminal statuses other than `completed` never carry a usable
        // completion.
        let status = body["status"].as_str().unwrap_or("unknown");
        if status != "completed" {
            return Err(LlmError::service_call(format!(
                "OpenAI call finished with status '{status}'"
            )));
        }

        let usage = &body["usage"];
        let input_total = usage["input_tokens"].as_u64().unwrap_or(0);
        let cached = usage["input_tokens_details"]["cached_tokens"]
            .as_u64()
            .unwrap_or(0);
        let output_total = usage["output_tokens"].as_u64().unwrap_or(0);
        let reasoning = usage["output_tokens_details"]["reasoning_tokens"]
            .as_u64()
            .unwrap_or(0);

        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = input_total.saturating_sub(cached);
        tokens.cached_input_tokens = cached;
        tokens.output_tokens = output_total.saturating_sub(reasoning);
        tokens.reasoning_output_tokens = reasoning;
        tokens.total_tokens = usage["total_tokens"]
            .as_u64()
            .unwrap_or(input_total + output_total);

        let output = extract_output_text(body);
        if output.is_empty() {
            return Err(LlmError::service_call(format!(
                "OpenAI call completed but returned an empty output \
                 (max_output_tokens={max_output_tokens}, output_tokens={}, reasoning={}, total={})",
                tokens.output_tokens, tokens.reasoning_output_tokens, tokens.total_tokens
            )));
        }
        Ok((output, tokens))
    }
}

/// Concatenate the output_text parts of every message item
fn extract_output_text(body: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(items) = body["output"].as_array() {
        for item in items {
            if item["type"].as_str() != Some("message") {
                continue;
            }
            if let Some(content) = item["content"].as_array() {
                for piece in content {
                    if piece["type"].as_str() == Some("output_text") {
                        if let Some(text) = piece["text"].as_str() {
                            parts.push(text);
                        }
                    }
                }
            }
        }
    }
    parts.join("").trim().to_string()
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
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
        let max_output_tokens = body["max_output_tokens"].as_u64().unwrap_or(0);
        let client = self.client().await?;

        debug!(model = %self.model.id, "calling openai responses");
        let response = client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Organization", &self.organization)
            .header("OpenAI-Project", &self.project)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(map_status("OpenAI", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid OpenAI response JSON: {e}")))?;
        self.parse_response(&parsed, max_output_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::Conversation;
    use crate::structured::{SchemaNode, StructuredResponse};

    fn openai_model(structured_output: bool) -> Model {
        Model {
            id: "OPENAI/gpt-4.1-mini".into(),
            internal_model_id: "gpt-4.1-mini".into(),
            provider: ModelProvider {
                name: "OPENAI".into(),
                config: Default::default(),
            },
            max_tokens: 128_000,
            max_output_tokens: 16_384,
            fixed_temperature: false,
            capabilities: ModelCapabilities {
                structured_output,
                ..Default::default()
            },
            price: ModelPrice {
                input_price_per_1m_tokens: 0.4,
                output_price_per_1m_tokens: 1.6,
                ..Default::default()
            },
            config: Default::default(),
        }
    }

    fn adapter(structured_output: bool) -> OpenAiAdapter {
        OpenAiAdapter {
            model: openai_model(structured_output),
            api_key: "sk-test".into(),
            organization: "org".into(),
            project: "proj".into(),
            base_url: BASE_URL.to_string(),
            client: RwLock::new(None),
        }
    }

    #[test]
    fn system_preamble_becomes_instructions() {
        let adapter = adapter(false);
        let request =
            LLMRequest::new(Conversation::from_prompt("q").with_system("short answers"));
        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["instructions"], "short answers");
        assert_eq!(body["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(body["text"]["format"]["type"], "text");
    }

    #[test]
    fn native_schema_path_emits_strict_json_schema() {
        let adapter = adapter(true);
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("the value")).unwrap();
        let request = LLMRequest::new(Conversation::from_prompt("q"))
            .with_response_model(schema.with_native(true));

        let body = adapter.convert(&request).unwrap();
        let format = &body["text"]["format"];
        assert_eq!(format["type"], "json_schema");
        assert_eq!(format["name"], "Answer");
        assert_eq!(format["strict"], true);
        assert_eq!(format["schema"]["additionalProperties"], false);
    }

    #[test]
    fn non_native_schema_falls_back_to_text_format() {
        let adapter = adapter(false);
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("the value")).unwrap();
        let request = LLMRequest::new(Conversation::from_prompt("q"))
            .with_response_model(schema.with_native(true));
        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["text"]["format"]["type"], "text");
    }

    #[test]
    fn token_mapping_splits_cached_and_reasoning() {
        let adapter = adapter(false);
        let body = json!({
            "status": "completed",
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [{"type": "output_text", "text": "hi there"}]}
            ],
            "usage": {
                "input_tokens": 100,
                "input_tokens_details": {"cached_tokens": 30},
                "output_tokens": 50,
                "output_tokens_details": {"reasoning_tokens": 20},
                "total_tokens": 150
            }
        });
        let (output, tokens) = adapter.parse_response(&body, 1024).unwrap();
        assert_eq!(output, "hi there");
        assert_eq!(tokens.input_tokens, 70);
        assert_eq!(tokens.cached_input_tokens, 30);
        assert_eq!(tokens.output_tokens, 30);
        assert_eq!(tokens.reasoning_output_tokens, 20);
        assert_eq!(tokens.total_tokens, 150);
        assert_eq!(tokens.input_price_per_1m_tokens, 0.4);
    }

    #[test]
    fn incomplete_status_is_a_service_error() {
        let adapter = adapter(false);
        let body = json!({"status": "incomplete", "output": [], "usage": {}});
        assert!(matches!(
            adapter.parse_response(&body, 10).unwrap_err(),
            LlmError::ServiceCall(_)
        ));
    }

    #[test]
    fn empty_completed_output_is_a_service_error() {
        let adapter = adapter(false);
        let body = json!({
            "status": "completed",
            "output": [],
            "usage": {"input_tokens": 5, "output_tokens": 0, "total_tokens": 5}
        });
        match adapter.parse_response(&body, 256).unwrap_err() {
            LlmError::ServiceCall(message) => assert!(message.contains("empty output")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
