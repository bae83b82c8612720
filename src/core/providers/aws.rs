//! AWS Bedrock adapter
//!
//! Speaks the Converse API on `bedrock-runtime`, signing each request
//! with SigV4. Bedrock enforces hard attachment limits, checked here at
//! conversion time so a bad request never reaches the wire: up to 20
//! images (each <= 3.75 MB and <= 8000x8000 px), up to 5 documents (each
//! <= 4.5 MB), and a text block is mandatory whenever documents are sent.

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use super::sigv4::SigV4Signer;
use super::{
    ProviderAdapter, check_capabilities, map_status, require_env_vars, tokens_with_rates,
    vendor_error_message,
};
use crate::config::Model;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::{LlmError, Result};

const MAX_IMAGES_PER_MESSAGE: usize = 20;
const MAX_IMAGE_BYTES: usize = 3_932_160; // 3.75 MB
const MAX_IMAGE_DIMENSION: u32 = 8000;
const MAX_DOCUMENTS_PER_MESSAGE: usize = 5;
const MAX_DOCUMENT_BYTES: usize = 4_718_592; // 4.5 MB

#[derive(Debug)]
pub struct AwsBedrockAdapter {
    model: Model,
    region: String,
    signer: SigV4Signer,
    client: RwLock<Option<reqwest::Client>>,
}

impl AwsBedrockAdapter {
    pub fn new(model: Model) -> Result<Self> {
        let values = require_env_vars(
            "AWS",
            &["AWS_DEFAULT_REGION", "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"],
        )?;
        let [region, access_key, secret_key]: [String; 3] =
            values.try_into().expect("three variables requested");
        let signer = SigV4Signer::new(access_key, secret_key, region.clone());
        Ok(Self {
            model,
            region,
            signer,
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
                .map_err(|e| LlmError::service_call(format!("failed to build AWS client: {e}")))?;
            *guard = Some(client);
        }
        Ok(guard.as_ref().expect("just set").clone())
    }

    fn endpoint(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/converse",
            self.region, self.model.internal_model_id
        )
    }

    /// Translate the neutral request into a Converse payload
    fn convert(&self, request: &LLMRequest) -> Result<Value> {
        check_capabilities(&self.model, request)?;

        let mut messages = Vec::new();
        for message in &request.conversation.messages {
            let mut content = Vec::new();
            if let Some(text) = &message.text {
                content.push(json!({"text": text}));
            }

            if message.images.len() > MAX_IMAGES_PER_MESSAGE {
                return Err(LlmError::conversion(format!(
                    "at most {MAX_IMAGES_PER_MESSAGE} images allowed per message, got {}",
                    message.images.len()
                )));
            }
            for image in &message.images {
                if image.size_bytes() > MAX_IMAGE_BYTES {
                    return Err(LlmError::conversion(format!(
                        "image size must be under 3.75 MB, got {:.2} MB",
                        image.size_bytes() as f64 / 1_048_576.0
                    )));
                }
                if let Some((width, height)) = image.dimensions() {
                    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
                        return Err(LlmError::conversion(format!(
                            "image dimensions must be under {MAX_IMAGE_DIMENSION}x{MAX_IMAGE_DIMENSION} px, got {width}x{height}"
                        )));
                    }
                }
                content.push(json!({
                    "image": {
                        "format": image.format.as_str(),
                        "source": {"bytes": image.as_base64()}
                    }
                }));
            }

            if message.documents.len() > MAX_DOCUMENTS_PER_MESSAGE {
                return Err(LlmError::conversion(format!(
                    "at most {MAX_DOCUMENTS_PER_MESSAGE} documents allowed per message, got {}",
                    message.documents.len()
                )));
            }
            if !message.documents.is_empty() && message.text.as_deref().unwrap_or("").is_empty() {
                return Err(LlmError::conversion(
                    "a text field is required when including documents",
                ));
            }
            for document in &message.documents {
                if document.size_bytes() > MAX_DOCUMENT_BYTES {
                    return Err(LlmError::conversion(format!(
                        "document size must be under 4.5 MB, got {:.2} MB",
                        document.size_bytes() as f64 / 1_048_576.0
                    )));
                }
                content.push(json!({
                    "document": {
                        "format": document.format.as_str(),
                        "name": document.name.clone().unwrap_or_default(),
                        "source": {"bytes": document.as_base64()}
                    }
                }));
            }

            messages.push(json!({"role": message.role.as_str(), "content": content}));
        }

        let mut inference_config = json!({
            "maxTokens": request
                .max_completion_tokens
                .unwrap_or(self.model.max_output_tokens),
        });
        if !self.model.fixed_temperature {
            inference_config["temperature"] = json!(request.temperature);
        }
        if let Some(top_p) = request.top_p {
            inference_config["topP"] = json!(top_p);
        }

        let mut body = json!({
            "messages": messages,
            "inferenceConfig": inference_config,
        });
        if let Some(system) = &request.conversation.system {
            if !system.is_empty() {
                body["system"] = json!([{"text": system}]);
            }
        }
        Ok(body)
    }

    fn parse_response(&self, body: &Value) -> Result<(String, ModelTokens)> {
        let output = body["output"]["message"]["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::service_call("AWS returned no text content"))?
            .to_string();

        let input_tokens = body["usage"]["inputTokens"].as_u64().unwrap_or(0);
        let output_tokens = body["usage"]["outputTokens"].as_u64().unwrap_or(0);
        let mut tokens = tokens_with_rates(&self.model);
        tokens.input_tokens = input_tokens;
        tokens.output_tokens = output_tokens;
        tokens.total_tokens = body["usage"]["totalTokens"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens);
        Ok((output, tokens))
    }
}

#[async_trait]
impl ProviderAdapter for AwsBedrockAdapter {
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
        let payload = serde_json::to_string(&body)
            .map_err(|e| LlmError::conversion(format!("failed to encode AWS request: {e}")))?;

        let url = self.endpoint();
        let headers = self
            .signer
            .sign("POST", &url, &payload, chrono::Utc::now())
            .map_err(LlmError::service_call)?;

        let client = self.client().await?;
        let mut http_request = client
            .post(&url)
            .header("content-type", "application/json")
            .body(payload);
        for (name, value) in headers {
            http_request = http_request.header(name, value);
        }

        debug!(model = %self.model.id, "calling bedrock converse");
        let response = http_request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if status != 200 {
            return Err(map_status("AWS", status, &vendor_error_message(&text)));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::service_call(format!("invalid AWS response JSON: {e}")))?;
        self.parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::{Conversation, Document, DocumentFormat};

    fn aws_model() -> Model {
        Model {
            id: "AWS/claude-3-haiku".into(),
            internal_model_id: "anthropic.claude-3-haiku-20240307-v1:0".into(),
            provider: ModelProvider {
                name: "AWS".into(),
                config: Default::default(),
            },
            max_tokens: 200_000,
            max_output_tokens: 4096,
            fixed_temperature: false,
            capabilities: ModelCapabilities {
                image_support: true,
                document_support: true,
                ..Default::default()
            },
            price: ModelPrice::default(),
            config: Default::default(),
        }
    }

    fn adapter() -> AwsBedrockAdapter {
        AwsBedrockAdapter {
            model: aws_model(),
            region: "us-east-1".into(),
            signer: SigV4Signer::new("ak".into(), "sk".into(), "us-east-1".into()),
            client: RwLock::new(None),
        }
    }

    #[test]
    fn converts_text_conversation_with_system_block() {
        let adapter = adapter();
        let mut conversation = Conversation::from_prompt("hello").with_system("be brief");
        conversation.add_text_message(crate::core::conversation::Role::Assistant, "hi");
        let request = LLMRequest::new(conversation).with_max_completion_tokens(256);

        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["system"][0]["text"], "be brief");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "hello");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["inferenceConfig"]["maxTokens"], 256);
        assert!((body["inferenceConfig"]["temperature"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn max_tokens_defaults_to_model_limit() {
        let adapter = adapter();
        let request = LLMRequest::new(Conversation::from_prompt("q"));
        let body = adapter.convert(&request).unwrap();
        assert_eq!(body["inferenceConfig"]["maxTokens"], 4096);
    }

    #[test]
    fn fixed_temperature_models_omit_temperature() {
        let mut adapter = adapter();
        adapter.model.fixed_temperature = true;
        let body = adapter
            .convert(&LLMRequest::new(Conversation::from_prompt("q")))
            .unwrap();
        assert!(body["inferenceConfig"].get("temperature").is_none());
    }

    #[test]
    fn documents_require_accompanying_text() {
        let adapter = adapter();
        let mut conversation = Conversation::new();
        conversation.add_document(
            Document::from_bytes(b"a,b\n1,2\n".to_vec(), DocumentFormat::Csv).unwrap(),
        );
        let request = LLMRequest::new(conversation);
        assert!(matches!(
            adapter.convert(&request).unwrap_err(),
            LlmError::Conversion(_)
        ));
    }

    #[test]
    fn oversized_documents_rejected() {
        let adapter = adapter();
        let mut conversation = Conversation::from_prompt("see attached");
        conversation.add_document(
            Document::from_bytes(vec![b'x'; MAX_DOCUMENT_BYTES + 1], DocumentFormat::Txt).unwrap(),
        );
        let request = LLMRequest::new(conversation);
        assert!(matches!(
            adapter.convert(&request).unwrap_err(),
            LlmError::Conversion(_)
        ));
    }

    #[test]
    fn parses_converse_response_tokens() {
        let adapter = adapter();
        let body = json!({
            "output": {"message": {"content": [{"text": "answer"}], "role": "assistant"}},
            "usage": {"inputTokens": 12, "outputTokens": 34, "totalTokens": 46}
        });
        let (output, tokens) = adapter.parse_response(&body).unwrap();
        assert_eq!(output, "answer");
        assert_eq!(tokens.input_tokens, 12);
        assert_eq!(tokens.output_tokens, 34);
        assert_eq!(tokens.total_tokens, 46);
    }
}
