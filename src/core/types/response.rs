//! Chat response model

use serde::{Deserialize, Serialize};

use crate::config::Model;
use crate::core::conversation::Conversation;
use crate::core::types::request::LLMRequest;
use crate::core::types::tokens::TokenTracker;
use crate::structured::StructuredResponse;
use crate::utils::error::Result;

/// Derived output of a response: plain text, or a parsed structured
/// instance when the request declared a response model
#[derive(Debug, Clone, PartialEq)]
pub enum LlmOutput {
    Text(String),
    Structured(StructuredResponse),
}

/// The normalized response returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMResponse {
    /// Echoes the request id
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_model: Option<StructuredResponse>,
    /// Raw model text before any structured parsing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Whether a vendor-native structured path served this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_response_format_used: Option<bool>,
    #[serde(default)]
    pub conversation: Conversation,
    /// Resolved catalog entry the call was routed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<Model>,
    #[serde(default)]
    pub tokens: TokenTracker,
    /// Unix seconds of the first attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    /// Seconds from first attempt to completion, backoff included
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
}

impl LLMResponse {
    /// Seed a response from its request: id, response model and
    /// conversation are echoed
    pub fn from_request(request: &LLMRequest) -> Self {
        Self {
            id: request.id.clone(),
            response_model: request.response_model.clone(),
            conversation: request.conversation.clone(),
            ..Default::default()
        }
    }

    /// Derive the caller-facing output.
    ///
    /// Without a response model this is the raw text; with one, the text
    /// is parsed into an instance and parse failures surface as the
    /// structured-response error kind carrying the offending text.
    pub fn output(&self) -> Result<Option<LlmOutput>> {
        let Some(raw_output) = &self.raw_output else {
            return Ok(None);
        };
        match &self.response_model {
            None => Ok(Some(LlmOutput::Text(raw_output.clone()))),
            Some(response_model) => {
                let mut parsed = response_model.clone();
                parsed.from_prompt(raw_output)?;
                Ok(Some(LlmOutput::Structured(parsed)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::structured::SchemaNode;
    use crate::utils::error::LlmError;

    #[test]
    fn from_request_echoes_identity() {
        let request = LLMRequest::new(Conversation::from_prompt("hello"));
        let response = LLMResponse::from_request(&request);
        assert_eq!(response.id, request.id);
        assert_eq!(response.conversation, request.conversation);
        assert!(response.raw_output.is_none());
    }

    #[test]
    fn text_output_without_response_model() {
        let mut response = LLMResponse::from_request(&LLMRequest::new(Conversation::from_prompt("q")));
        response.raw_output = Some("plain answer".into());
        match response.output().unwrap() {
            Some(LlmOutput::Text(text)) => assert_eq!(text, "plain answer"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn structured_output_parses_raw_text() {
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("the value")).unwrap();
        let request =
            LLMRequest::new(Conversation::from_prompt("q")).with_response_model(schema);
        let mut response = LLMResponse::from_request(&request);
        response.raw_output = Some("<answer><value>7</value></answer>".into());

        match response.output().unwrap() {
            Some(LlmOutput::Structured(parsed)) => {
                assert_eq!(parsed.instance.unwrap(), json!({"value": 7}));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn structured_parse_failure_carries_text_and_class() {
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("the value")).unwrap();
        let request =
            LLMRequest::new(Conversation::from_prompt("q")).with_response_model(schema);
        let mut response = LLMResponse::from_request(&request);
        response.raw_output = Some("no xml at all".into());

        match response.output().unwrap_err() {
            LlmError::StructuredResponse { xml, return_class, .. } => {
                assert_eq!(xml, "no xml at all");
                assert_eq!(return_class, "Answer");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
