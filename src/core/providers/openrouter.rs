//! OpenRouter adapter
//!
//! OpenAI-compatible chat completions behind `openrouter.ai`. Optional
//! site attribution travels as `HTTP-Referer` / `X-Title` headers.
//! Text-only messages collapse to plain string content.

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

const BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug)]
pub struct OpenRouterAdapter {
    model: Model,
    api_key: String,
    site_url: Option<String>,
    site_name: Option<String>,
    base_url: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl OpenRouterAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let values = require_env_vars("OpenRouter", &["OPENROUTER_API_KEY"])?;
        let [api_key]: [String; 1] = values.try_into().expect("one variable requested");
        Ok(Self {
            model,
            api_key,
            site_url: std::env::var("OPENROUTER_SITE_URL").ok(),
            site_name: std::env::var("OPENROUTER_SITE_NAME").ok(),
            base_url: BASE_URL.to_string(),
            client: RwLock::new(None),
        })
    }

    #[cfg(test)]
    fn for_tests(model: Model, base_url: String) -> Self {
        Self {
            model,
            api_key: "test-key".into(),
            site_url: Some("https://example.com".into()),
            site_name: Some("Example".into()),
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
                    LlmError::service_call(format!("failed to build OpenRouter client: {e}"))
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
            // text-only messages use the simple string form
            if content.len() == 1 && content[0]["type"] == "text" {
                messages.push(json!({
                    "role": message.role.as_str(),
                    "content": content[0]["text"],
                }));
            } else {
                messages.push(json!({"role": message.role.as_str(), "content": content}));
            }
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

    fn parse_response(&self, body: &Value) -> Result<(String, ModelTokens)> {
        // OpenRouter reports some upstream failures inside a 200 body
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            let message = error["message"].as_str().unwrap_or("unknown error");
            let code = error["code"].as_i64().unwrap_or(500) as u16;
            return Err(map_status("OpenRouter", code, message));
        }

        let output = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        if output.is_empty() {
            return Err(LlmError::service_call("OpenRouter returned an empty completion"));
        }

        let usage = &body["usage"];
        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0);
        tokens.output_tokens = usage["completion_tokens"].as_u64().unwrap_or(0);
        tokens.total_tokens = usage["total_tokens"]
            .as_u64()
            .unwrap_or(tokens.input_tokens + tokens.output_tokens);
        Ok((output, tokens))
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
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

        let mut http_request = client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(site_url) = &self.site_url {
            http_request = http_request.header("HTTP-Referer", site_url);
        }
        if let Some(site_name) = &self.site_name {
            http_request = http_request.header("X-Title", site_name);
        }

        debug!(model = %self.model.id, "calling openrouter chat completions");
        let response = http_request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(map_status("OpenRouter", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid OpenRouter response JSON: {e}")))?;
        self.parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::Conversation;

    fn openrouter_model() -> Model {
        Model {
            id: "OPENROUTER/llama-3.3-70b".into(),
            internal_model_id: "meta-llama/llama-3.3-70b-instruct".into(),
            provider: ModelProvider {
                name: "OPENROUTER".into(),
                config: Default::default(),
            },
            max_tokens: 131_072,
            max_output_tokens: 4096,
            fixed_temperature: false,
            capabilities: ModelCapabilities::default(),
            price: ModelPrice::default(),
            config: Default::default(),
        }
    }

    #[test]
    fn text_only_messages_collapse_to_string_content() {
        let adapter = OpenRouterAdapter::for_tests(openrouter_model(), BASE_URL.into());
        let request = LLMRequest::new(Conversation::from_prompt("hi").with_system("sys"));
        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["model"], "meta-llama/llama-3.3-70b-instruct");
    }

    #[tokio::test]
    async fn happy_path_round_trip_over_the_wire() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("HTTP-Referer", "https://example.com"))
            .and(header("X-Title", "Example"))
            .and(body_partial_json(json!({
                "model": "meta-llama/llama-3.3-70b-instruct"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "choices": [{"message": {"role": "assistant", "content": "pong"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = OpenRouterAdapter::for_tests(openrouter_model(), server.uri());
        let request = LLMRequest::new(Conversation::from_prompt("ping"));
        let (output, tokens) = adapter.service_call(&request).await.unwrap();
        assert_eq!(output, "pong");
        assert_eq!(tokens.input_tokens, 3);
        assert_eq!(tokens.total_tokens, 4);
    }

    #[tokio::test]
    async fn http_429_maps_to_throttling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "rate limited, slow down"}
            })))
            .mount(&server)
            .await;

        let adapter = OpenRouterAdapter::for_tests(openrouter_model(), server.uri());
        let request = LLMRequest::new(Conversation::from_prompt("ping"));
        match adapter.service_call(&request).await.unwrap_err() {
            LlmError::Throttling(message) => assert!(message.contains("slow down")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_inside_200_body_is_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"message": "No endpoints found", "code": 404}
            })))
            .mount(&server)
            .await;

        let adapter = OpenRouterAdapter::for_tests(openrouter_model(), server.uri());
        let request = LLMRequest::new(Conversation::from_prompt("ping"));
        assert!(matches!(
            adapter.service_call(&request).await.unwrap_err(),
            LlmError::ModelNotFound(_)
        ));
    }
}
