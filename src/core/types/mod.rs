//! Request, response and token types shared across the dispatch pipeline

mod request;
mod response;
mod tokens;

pub use request::{LLMRequest, RequestType};
pub use response::{LLMResponse, LlmOutput};
pub use tokens::{ModelTokens, TokenTracker};
