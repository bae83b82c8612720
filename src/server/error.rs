//! HTTP mapping of the core error taxonomy
//!
//! The only place where error kinds meet status codes. Bodies follow the
//! `{detail: {error, message, ...}}` shape; structured-response failures
//! additionally expose the offending text and target class so clients
//! can inspect or re-prompt.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::utils::error::LlmError;

impl ResponseError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            LlmError::Conversion(_) => StatusCode::BAD_REQUEST,
            LlmError::Credentials(_) => StatusCode::UNAUTHORIZED,
            LlmError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            LlmError::StructuredResponse { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LlmError::Throttling(_) => StatusCode::TOO_MANY_REQUESTS,
            LlmError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LlmError::ServiceCall(_) => StatusCode::BAD_GATEWAY,
            LlmError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut detail = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let LlmError::StructuredResponse { xml, return_class, .. } = self {
            detail["xml"] = json!(xml);
            detail["return_class"] = json!(return_class);
        }
        HttpResponse::build(self.status_code()).json(json!({"detail": detail}))
    }
}
