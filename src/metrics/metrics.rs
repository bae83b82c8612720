//! Per-call metric record

use serde::{Deserialize, Serialize};

use crate::core::types::LLMResponse;

/// One dispatched call, as recorded by the log manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default)]
    pub call_start_time: f64,
    #[serde(default)]
    pub call_end_time: f64,
    #[serde(default)]
    pub call_duration: f64,

    /// Total tokens over total duration
    #[serde(default)]
    pub tokens_per_second: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub internal_retries: u32,
}

impl ModelMetrics {
    /// Record a completed dispatch
    pub fn from_response(response: &LLMResponse, status_code: u16) -> Self {
        let total_tokens = response.tokens.total_tokens();
        let duration = response.total_duration.unwrap_or(0.0);
        let tokens_per_second = if duration > 0.0 && total_tokens > 0 {
            total_tokens as f64 / duration
        } else {
            0.0
        };
        Self {
            input_tokens: response.tokens.input_tokens(),
            output_tokens: response.tokens.completion_tokens(),
            total_tokens,
            call_start_time: response.start_time.unwrap_or(0.0),
            call_end_time: response.end_time.unwrap_or(0.0),
            call_duration: duration,
            tokens_per_second,
            status_code: Some(status_code),
            ..Default::default()
        }
    }

    /// Record a failed dispatch with synthetic timestamps
    pub fn from_error(status_code: u16, error_message: impl Into<String>, now: f64) -> Self {
        Self {
            call_start_time: now,
            call_end_time: now,
            status_code: Some(status_code),
            error_message: error_message.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ModelTokens, TokenTracker};

    #[test]
    fn from_response_derives_tokens_per_second() {
        let mut tokens = TokenTracker::new();
        tokens.add(
            "M/x",
            &ModelTokens {
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
                ..Default::default()
            },
        );
        let response = LLMResponse {
            tokens,
            start_time: Some(100.0),
            end_time: Some(103.0),
            total_duration: Some(3.0),
            ..Default::default()
        };
        let record = ModelMetrics::from_response(&response, 200);
        assert_eq!(record.total_tokens, 30);
        assert!((record.tokens_per_second - 10.0).abs() < 1e-9);
        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.call_duration, 3.0);
    }

    #[test]
    fn zero_duration_means_zero_rate() {
        let response = LLMResponse::default();
        let record = ModelMetrics::from_response(&response, 200);
        assert_eq!(record.tokens_per_second, 0.0);
    }

    #[test]
    fn error_records_use_synthetic_timestamps() {
        let record = ModelMetrics::from_error(429, "throttled", 1234.5);
        assert_eq!(record.call_start_time, 1234.5);
        assert_eq!(record.call_end_time, 1234.5);
        assert_eq!(record.call_duration, 0.0);
        assert_eq!(record.status_code, Some(429));
        assert_eq!(record.error_message, "throttled");
    }
}
