//! Google adapter
//!
//! Calls `generateContent` in one of two modes: Google AI Studio with an
//! API key, or Vertex AI with a project/location pair and an OAuth bearer
//! token. Google names the assistant role `model`, and images travel as
//! inline base64 parts.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    ProviderAdapter, check_capabilities, map_status, tokens_with_rates, vendor_error_message,
};
use crate::config::Model;
use crate::core::conversation::Role;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

#[derive(Debug)]
enum GoogleAuth {
    /// Google AI Studio: key as a query parameter
    ApiKey(String),
    /// Vertex AI: project/location endpoint plus an OAuth bearer token
    Vertex {
        project: String,
        location: String,
        access_token: String,
    },
}

#[derive(Debug)]
pub struct GoogleAdapter {
    model: Model,
    auth: GoogleAuth,
    client: RwLock<Option<reqwest::Client>>,
}

impl GoogleAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let auth = if let Ok(api_key) = std::env::var("GOOGLE_API_KEY") {
            GoogleAuth::ApiKey(api_key)
        } else {
            match (
                std::env::var("GOOGLE_CLOUD_PROJECT"),
                std::env::var("GOOGLE_CLOUD_LOCATION"),
            ) {
                (Ok(project), Ok(location)) => {
                    let access_token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| {
                        LlmError::credentials(
                            "Vertex mode needs GOOGLE_OAUTH_ACCESS_TOKEN alongside \
                             GOOGLE_CLOUD_PROJECT and GOOGLE_CLOUD_LOCATION",
                        )
                    })?;
                    GoogleAuth::Vertex {
                        project,
                        location,
                        access_token,
                    }
                }
                _ => {
                    return Err(LlmError::credentials(
                        "missing required environment variables for Google: set GOOGLE_API_KEY, \
                         or both GOOGLE_CLOUD_PROJECT and GOOGLE_CLOUD_LOCATION",
                    ));
                }
            }
        };
        Ok(Self {
            model,
            auth,
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
                .map_err(|e| LlmError::service_call(format!("failed to build Google client: {e}")))?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just set").clone())
    }

    fn endpoint(&self) -> String {
        match &self.auth {
            GoogleAuth::ApiKey(_) => format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model.internal_model_id
            ),
            GoogleAuth::Vertex {
                project, location, ..
            } => format!(
                "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
                self.model.internal_model_id
            ),
        }
    }

    fn convert(&self, request: &LLMRequest) -> Result<Value> {
        check_capabilities(&self.model, request)?;

        let mut contents = Vec::new();
        for message in &request.conversation.messages {
            let role = match message.role {
                Role::Assistant => "model",
                other => other.as_str(),
            };
            let mut parts = Vec::new();
            if let Some(text) = &message.text {
                parts.push(json!({"text": text}));
            }
            for image in &message.images {
                parts.push(json!({
                    "inline_data": {
                        "mime_type": image.format.mime(),
                        "data": image.as_base64(),
                    }
                }));
            }
            if !parts.is_empty() {
                contents.push(json!({"role": role, "parts": parts}));
            }
        }

        let mut generation_config = json!({
            "maxOutputTokens": request
                .max_completion_tokens
                .unwrap_or(self.model.max_output_tokens),
        });
        if !self.model.fixed_temperature {
            generation_config["temperature"] = json!(request.temperature);
        }
        if let Some(top_p) = request.top_p {
            generation_config["topP"] = json!(top_p);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(system) = &request.conversation.system {
            if !system.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
        }
        Ok(body)
    }

    fn parse_response(&self, body: &Value) -> Result<(String, ModelTokens)> {
        let output = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if output.is_empty() {
            return Err(LlmError::service_call("Google returned an empty response"));
        }

        let usage = &body["usageMetadata"];
        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = usage["promptTokenCount"].as_u64().unwrap_or(0);
        tokens.cached_input_tokens = usage["cachedContentTokenCount"].as_u64().unwrap_or(0);
        tokens.output_tokens = usage["candidatesTokenCount"].as_u64().unwrap_or(0);
        tokens.reasoning_output_tokens = usage["thoughtsTokenCount"].as_u64().unwrap_or(0);
        tokens.total_tokens = usage["totalTokenCount"]
            .as_u64()
            .unwrap_or(tokens.input_tokens + tokens.output_tokens);
        Ok((output, tokens))
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
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

        debug!(model = %self.model.id, "calling google generateContent");
        let mut http_request = client.post(self.endpoint()).json(&body);
        http_request = match &self.auth {
            GoogleAuth::ApiKey(key) => http_request.query(&[("key", key.as_str())]),
            GoogleAuth::Vertex { access_token, .. } => http_request.bearer_auth(access_token),
        };

        let response = http_request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if status != 200 {
            return Err(map_status("Google", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid Google response JSON: {e}")))?;
        self.parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::Conversation;

    fn google_model() -> Model {
        Model {
            id: "GOOGLE/gemini-2.0-flash".into(),
            internal_model_id: "gemini-2.0-flash".into(),
            provider: ModelProvider {
                name: "GOOGLE".into(),
                config: Default::default(),
            },
            max_tokens: 1_000_000,
            max_output_tokens: 8192,
            fixed_temperature: false,
            capabilities: ModelCapabilities::default(),
            price: ModelPrice::default(),
            config: Default::default(),
        }
    }

    fn adapter(auth: GoogleAuth) -> GoogleAdapter {
        GoogleAdapter {
            model: google_model(),
            auth,
            client: RwLock::new(None),
        }
    }

    #[test]
    fn assistant_role_becomes_model() {
        let adapter = adapter(GoogleAuth::ApiKey("k".into()));
        let mut conversation = Conversation::from_prompt("question");
        conversation.add_text_message(Role::Assistant, "answer");
        let body = adapter.convert(&LLMRequest::new(conversation)).unwrap();
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
    }

    #[test]
    fn system_goes_to_system_instruction() {
        let adapter = adapter(GoogleAuth::ApiKey("k".into()));
        let request = LLMRequest::new(Conversation::from_prompt("q").with_system("rules"));
        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn endpoints_differ_by_auth_mode() {
        let studio = adapter(GoogleAuth::ApiKey("k".into()));
        assert_eq!(
            studio.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        let vertex = adapter(GoogleAuth::Vertex {
            project: "proj".into(),
            location: "europe-west1".into(),
            access_token: "tok".into(),
        });
        assert_eq!(
            vertex.endpoint(),
            "https://europe-west1-aiplatform.googleapis.com/v1/projects/proj/locations/europe-west1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn token_mapping_reads_usage_metadata() {
        let adapter = adapter(GoogleAuth::ApiKey("k".into()));
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "out"}], "role": "model"}}],
            "usageMetadata": {
                "promptTokenCount": 11,
                "candidatesTokenCount": 7,
                "thoughtsTokenCount": 3,
                "cachedContentTokenCount": 2,
                "totalTokenCount": 21
            }
        });
        let (output, tokens) = adapter.parse_response(&body).unwrap();
        assert_eq!(output, "out");
        assert_eq!(tokens.input_tokens, 11);
        assert_eq!(tokens.output_tokens, 7);
        assert_eq!(tokens.reasoning_output_tokens, 3);
        assert_eq!(tokens.cached_input_tokens, 2);
        assert_eq!(tokens.total_tokens, 21);
    }

    #[test]
    fn empty_candidates_is_a_service_error() {
        let adapter = adapter(GoogleAuth::ApiKey("k".into()));
        let body = json!({"candidates": [], "usageMetadata": {}});
        assert!(matches!(
            adapter.parse_response(&body).unwrap_err(),
            LlmError::ServiceCall(_)
        ));
    }
}
