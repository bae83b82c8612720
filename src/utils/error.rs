//! Error taxonomy for the gateway core
//!
//! A closed set of failure kinds surfaced to callers. Only `Throttling` is
//! retryable; everything else terminates the attempt. HTTP status mapping
//! lives at the server boundary, never here.

use thiserror::Error;

/// Result type alias for the gateway core
pub type Result<T> = std::result::Result<T, LlmError>;

/// Failure kinds surfaced by the dispatch core and its collaborators
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Required configuration variable absent at adapter construction
    #[error("Missing credentials: {0}")]
    Credentials(String),

    /// Registry miss, or vendor-side 404
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Neutral-to-vendor translation failed, including capability gating
    /// rejections and malformed attachments
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// Vendor-signaled rate limiting; the only retryable kind
    #[error("Service throttled: {0}")]
    Throttling(String),

    /// Any other vendor failure: status, network, empty completion,
    /// non-terminal completion status
    #[error("Service call failed: {0}")]
    ServiceCall(String),

    /// Structured-response parse failure; keeps the offending text and the
    /// target class name so the caller can inspect or re-prompt
    #[error("Structured response error for '{return_class}': {message}")]
    StructuredResponse {
        message: String,
        xml: String,
        return_class: String,
    },

    /// I/O timeout at the transport or an explicit request deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Registry or adapter-factory misconfiguration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials(message.into())
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::ModelNotFound(message.into())
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    pub fn throttling(message: impl Into<String>) -> Self {
        Self::Throttling(message.into())
    }

    pub fn service_call(message: impl Into<String>) -> Self {
        Self::ServiceCall(message.into())
    }

    pub fn structured_response(
        message: impl Into<String>,
        xml: impl Into<String>,
        return_class: impl Into<String>,
    ) -> Self {
        Self::StructuredResponse {
            message: message.into(),
            xml: xml.into(),
            return_class: return_class.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether the retry wrapper may re-attempt after this error
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttling(_))
    }

    /// Machine-readable kind tag used in boundary error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "credentials_exception",
            Self::ModelNotFound(_) => "model_not_found",
            Self::Conversion(_) => "internal_conversion_exception",
            Self::Throttling(_) => "service_throttling_exception",
            Self::ServiceCall(_) => "service_call_exception",
            Self::StructuredResponse { .. } => "structured_response_exception",
            Self::Timeout(_) => "timeout_exception",
            Self::Config(_) => "configuration_error",
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::ServiceCall(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_throttling_is_retryable() {
        assert!(LlmError::throttling("slow down").is_throttling());
        assert!(!LlmError::service_call("boom").is_throttling());
        assert!(!LlmError::timeout("deadline").is_throttling());
        assert!(!LlmError::conversion("bad image").is_throttling());
    }

    #[test]
    fn structured_response_keeps_offending_text() {
        let err = LlmError::structured_response("bad int", "<w><x>oops</x></w>", "Weather");
        match err {
            LlmError::StructuredResponse { xml, return_class, .. } => {
                assert_eq!(xml, "<w><x>oops</x></w>");
                assert_eq!(return_class, "Weather");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(LlmError::throttling("x").kind(), "service_throttling_exception");
        assert_eq!(LlmError::model_not_found("x").kind(), "model_not_found");
    }
}
