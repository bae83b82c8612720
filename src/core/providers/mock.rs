//! Mock adapter
//!
//! No credentials, no network. Sleeps a uniform 5-10 seconds and echoes
//! the last user message, so load tests exercise the full dispatch path
//! with realistic latency.

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use super::{ProviderAdapter, tokens_with_rates};
use crate::config::Model;
use crate::core::types::{LLMRequest, ModelTokens};
use crate::utils::error::Result;

#[derive(Debug)]
pub struct MockAdapter {
    model: Model,
}

impl MockAdapter {
    pub fn new(model: Model) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn model(&self) -> &Model {
        &self.model
    }

    async fn service_call(&self, request: &LLMRequest) -> Result<(String, ModelTokens)> {
        let seconds = rand::thread_rng().gen_range(5..=10);
        debug!(model = %self.model.id, seconds, "mock call sleeping");
        tokio::time::sleep(std::time::Duration::from_secs(seconds)).await;

        let prompt = request.conversation.last_text().unwrap_or_default();
        let message = format!("{prompt} (message took {seconds} seconds to generate).");
        Ok((message, tokens_with_rates(&self.model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::Conversation;

    fn mock_model() -> Model {
        Model {
            id: "MOCK/mock".into(),
            internal_model_id: "mock".into(),
            provider: ModelProvider {
                name: "MOCK".into(),
                config: Default::default(),
            },
            max_tokens: 10_000,
            max_output_tokens: 10_000,
            fixed_temperature: false,
            capabilities: ModelCapabilities::default(),
            price: ModelPrice::default(),
            config: Default::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn echoes_last_user_message_with_latency_note() {
        let adapter = MockAdapter::new(mock_model());
        let request = LLMRequest::new(Conversation::from_prompt("Message 7"));
        let (output, tokens) = adapter.service_call(&request).await.unwrap();

        assert!(output.starts_with("Message 7 (message took "));
        assert!(output.ends_with(" seconds to generate)."));
        assert_eq!(tokens.total_tokens, 0);
        assert_eq!(tokens.input_tokens, 0);
        assert_eq!(tokens.output_tokens, 0);
    }
}
