//! Dispatch core
//!
//! Orchestrates one chat call: start the adapter, run the vendor call
//! through the retry wrapper, validate structured output, accumulate
//! token counts, and stamp timing. Total duration includes every backoff
//! delay the wrapper slept through.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::core::providers::{ProviderAdapter, use_native_schema};
use crate::core::types::{LLMRequest, LLMResponse};
use crate::utils::error::{LlmError, Result};
use crate::utils::time::unix_now;

/// Handle one request end to end through the given adapter
pub async fn dispatch(adapter: &dyn ProviderAdapter, request: &LLMRequest) -> Result<LLMResponse> {
    request.validate()?;
    adapter.start().await?;

    let model = adapter.model().clone();
    let mut response = LLMResponse::from_request(request);
    response.llm_model = Some(model.clone());

    let start_unix = unix_now();
    let started = Instant::now();
    let deadline = request.timeout.map(Duration::from_secs_f64);

    let (output, tokens) = retry_with_backoff(
        || adapter.service_call(request),
        request.max_retries,
        deadline,
    )
    .await?;

    // Validate structured output now so a parse failure terminates the
    // call instead of surfacing lazily at output() time.
    if let Some(schema) = &mut response.response_model {
        schema.from_prompt(&output)?;
        response.native_response_format_used = Some(use_native_schema(&model, request));
    }

    response.raw_output = Some(output);
    response.tokens.add(model.id.clone(), &tokens);

    let total = started.elapsed().as_secs_f64();
    response.start_time = Some(start_unix);
    response.end_time = Some(start_unix + total);
    response.total_duration = Some(total);
    Ok(response)
}

/// Retry a vendor call on throttling only, with pure exponential backoff.
///
/// The delay before the k-th retry is `2^(k-1)` seconds. After
/// `max_retries` retries the terminal throttling error reports the retry
/// count and the elapsed time. Any non-throttling error propagates
/// immediately. An optional deadline bounds the whole loop: expiry during
/// the vendor call or a backoff sleep surfaces as the timeout kind with
/// no further retry.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    deadline: Option<Duration>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let mut retries: u32 = 0;

    loop {
        let attempt = operation();
        let result = match deadline {
            None => attempt.await,
            Some(limit) => {
                let Some(left) = limit.checked_sub(started.elapsed()) else {
                    return Err(deadline_error(limit));
                };
                match tokio::time::timeout(left, attempt).await {
                    Ok(result) => result,
                    Err(_) => return Err(deadline_error(limit)),
                }
            }
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_throttling() => {
                retries += 1;
                if retries > max_retries {
                    let elapsed = started.elapsed().as_secs_f64();
                    debug!(max_retries, elapsed, "throttling retries exhausted");
                    return Err(LlmError::throttling(format!(
                        "service throttled after {max_retries} retries over {elapsed:.2} seconds"
                    )));
                }

                let delay = Duration::from_secs(1u64 << (retries - 1));
                debug!(
                    retry = retries,
                    delay_s = delay.as_secs(),
                    "service throttled, backing off"
                );
                match deadline {
                    None => tokio::time::sleep(delay).await,
                    Some(limit) => {
                        let Some(left) = limit.checked_sub(started.elapsed()) else {
                            return Err(deadline_error(limit));
                        };
                        if delay >= left {
                            tokio::time::sleep(left).await;
                            return Err(deadline_error(limit));
                        }
                        tokio::time::sleep(delay).await;
                    }
                }
            }
            Err(error) => return Err(error),
        }
    }
}

fn deadline_error(limit: Duration) -> LlmError {
    LlmError::timeout(format!(
        "request deadline of {:.2}s exceeded",
        limit.as_secs_f64()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{Model, ModelCapabilities, ModelPrice, ModelProvider};
    use crate::core::conversation::Conversation;
    use crate::core::types::ModelTokens;
    use crate::structured::{SchemaNode, StructuredResponse};

    fn test_model() -> Model {
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

    /// Throttles `failures` times, then answers with `output`
    #[derive(Debug)]
    struct FlakyAdapter {
        model: Model,
        failures: u32,
        output: String,
        calls: Arc<AtomicU32>,
        call_delay: Duration,
    }

    impl FlakyAdapter {
        fn new(failures: u32, output: &str) -> Self {
            Self {
                model: test_model(),
                failures,
                output: output.to_string(),
                calls: Arc::new(AtomicU32::new(0)),
                call_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FlakyAdapter {
        fn model(&self) -> &Model {
            &self.model
        }

        async fn service_call(&self, _request: &LLMRequest) -> Result<(String, ModelTokens)> {
            if !self.call_delay.is_zero() {
                tokio::time::sleep(self.call_delay).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(LlmError::throttling("simulated throttle"))
            } else {
                Ok((self.output.clone(), ModelTokens::default()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_throttles_then_success_sleeps_one_two_four() {
        let adapter = FlakyAdapter::new(3, "ok");
        let request = LLMRequest::new(Conversation::from_prompt("hi"));

        let before = Instant::now();
        let response = dispatch(&adapter, &request).await.unwrap();
        let elapsed = before.elapsed().as_secs_f64();

        assert_eq!(response.raw_output.as_deref(), Some("ok"));
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 4);
        // 1 + 2 + 4 seconds of backoff under the paused clock
        assert!(elapsed >= 7.0, "elapsed {elapsed}");
        assert!(response.total_duration.unwrap() >= 7.0);
        assert!(response.end_time.unwrap() >= response.start_time.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_retry_count_and_duration() {
        let adapter = FlakyAdapter::new(6, "never");
        let request = LLMRequest::new(Conversation::from_prompt("hi")).with_max_retries(5);

        match dispatch(&adapter, &request).await.unwrap_err() {
            LlmError::Throttling(message) => {
                assert!(message.contains('5'), "message: {message}");
                assert!(message.contains("seconds"), "message: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // initial attempt + 5 retries
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_wrapper_sleeps_exact_backoff_sequence() {
        let calls = Arc::new(AtomicU32::new(0));
        let inner = calls.clone();
        let before = Instant::now();
        let result: Result<&str> = retry_with_backoff(
            move || {
                let calls = inner.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 4 {
                        Err(LlmError::throttling("again"))
                    } else {
                        Ok("done")
                    }
                }
            },
            5,
            None,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        let elapsed = before.elapsed().as_secs_f64();
        // 1 + 2 + 4 + 8 seconds
        assert!((elapsed - 15.0).abs() < 0.5, "elapsed {elapsed}");
    }

    #[tokio::test]
    async fn non_throttling_errors_propagate_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let inner = calls.clone();
        let result: Result<()> = retry_with_backoff(
            move || {
                let calls = inner.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::service_call("hard failure"))
                }
            },
            5,
            None,
        )
        .await;

        assert!(matches!(result.unwrap_err(), LlmError::ServiceCall(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_vendor_call_times_out() {
        let mut adapter = FlakyAdapter::new(0, "late");
        adapter.call_delay = Duration::from_secs(30);
        let request = LLMRequest::new(Conversation::from_prompt("hi")).with_timeout(2.0);

        assert!(matches!(
            dispatch(&adapter, &request).await.unwrap_err(),
            LlmError::Timeout(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_backoff_times_out_without_retry() {
        let adapter = FlakyAdapter::new(10, "never");
        let request = LLMRequest::new(Conversation::from_prompt("hi")).with_timeout(2.5);

        assert!(matches!(
            dispatch(&adapter, &request).await.unwrap_err(),
            LlmError::Timeout(_)
        ));
        // first attempt throttles (sleep 1s), second throttles, then the
        // 2s backoff crosses the 2.5s deadline
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn structured_output_is_validated_in_dispatch() {
        let adapter = FlakyAdapter::new(0, "<answer><value>12</value></answer>");
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("v")).unwrap();
        let request =
            LLMRequest::new(Conversation::from_prompt("hi")).with_response_model(schema);

        let response = dispatch(&adapter, &request).await.unwrap();
        let parsed = response.response_model.as_ref().unwrap();
        assert_eq!(parsed.instance.as_ref().unwrap()["value"], 12);
        assert_eq!(response.native_response_format_used, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn structured_parse_failure_carries_offending_text() {
        let adapter = FlakyAdapter::new(0, "<answer><value>twelve</value></answer>");
        let mut schema = StructuredResponse::new("Answer");
        schema.add_node("value", SchemaNode::int_field("v")).unwrap();
        let request =
            LLMRequest::new(Conversation::from_prompt("hi")).with_response_model(schema);

        match dispatch(&adapter, &request).await.unwrap_err() {
            LlmError::StructuredResponse { xml, return_class, .. } => {
                assert!(xml.contains("twelve"));
                assert_eq!(return_class, "Answer");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_are_keyed_by_model_id() {
        let adapter = FlakyAdapter::new(0, "ok");
        let request = LLMRequest::new(Conversation::from_prompt("hi"));
        let response = dispatch(&adapter, &request).await.unwrap();
        assert_eq!(response.tokens.stats.len(), 1);
        assert!(response.tokens.stats.contains_key("MOCK/mock"));
        assert_eq!(response.tokens.total_tokens(), 0);
    }
}
