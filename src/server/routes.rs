//! Route handlers
//!
//! The HTTP surface over the dispatch core. Each chat call spawns a
//! fire-and-forget metrics task so recording never adds latency to the
//! response path; recorder failures are logged out of band.

use std::sync::atomic::Ordering;

use actix_web::{HttpResponse, Result as ActixResult, web};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::state::AppState;
use crate::config::{Model, ModelProvider};
use crate::core::dispatch::dispatch;
use crate::core::types::{LLMRequest, LLMResponse};
use crate::metrics::{LogStats, ModelMetrics};
use crate::utils::error::LlmError;
use crate::utils::time::unix_now;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat/{provider}/{name}", web::post().to(chat))
        .route("/list_models", web::post().to(list_models))
        .route("/list_providers", web::get().to(list_providers))
        .route("/model_info", web::get().to(model_info))
        .route("/get_stats", web::post().to(get_stats))
        .route("/health", web::get().to(health));
}

#[derive(Debug, Deserialize)]
struct ListModelsQuery {
    provider: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelInfoQuery {
    model_id: String,
}

#[derive(Debug, Deserialize)]
struct GetStatsRequest {
    model_key: String,
    start_time: Option<f64>,
    end_time: Option<f64>,
    #[serde(default = "default_stats_limit")]
    limit: usize,
}

fn default_stats_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
struct GetStatsResponse {
    model_key: String,
    stats: LogStats,
    logs: Vec<ModelMetrics>,
    total_returned: usize,
}

async fn chat(
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
    request: web::Json<LLMRequest>,
) -> Result<HttpResponse, LlmError> {
    let (provider, name) = path.into_inner();
    let model_key = format!("{provider}/{name}");
    let request = request.into_inner();
    info!(%model_key, request_id = %request.id, "chat request");

    let adapter = state
        .adapter(&model_key)
        .ok_or_else(|| LlmError::model_not_found(format!("model {model_key} not found")))?;

    state.chat_request_count.fetch_add(1, Ordering::Relaxed);
    *state
        .model_usage
        .lock()
        .entry(model_key.clone())
        .or_default() += 1;

    match dispatch(adapter.as_ref(), &request).await {
        Ok(response) => {
            record_success(&state, &model_key, &response);
            Ok(HttpResponse::Ok().json(response))
        }
        Err(error) => {
            warn!(%model_key, "chat request failed: {error}");
            record_error(&state, &model_key, &error);
            Err(error)
        }
    }
}

/// Hand a success record to the log manager without blocking the
/// response path
fn record_success(state: &web::Data<AppState>, model_key: &str, response: &LLMResponse) {
    let log_manager = state.log_manager.clone();
    let model_key = model_key.to_string();
    let record = ModelMetrics::from_response(response, 200);
    tokio::spawn(async move {
        if let Err(e) = log_manager.add_log(&model_key, record).await {
            error!(%model_key, "failed to record metrics: {e}");
        }
    });
}

fn record_error(state: &web::Data<AppState>, model_key: &str, error: &LlmError) {
    use actix_web::ResponseError;

    let log_manager = state.log_manager.clone();
    let model_key = model_key.to_string();
    let record = ModelMetrics::from_error(
        error.status_code().as_u16(),
        error.to_string(),
        unix_now(),
    );
    tokio::spawn(async move {
        if let Err(e) = log_manager.add_log(&model_key, record).await {
            error!(%model_key, "failed to record error metrics: {e}");
        }
    });
}

async fn list_models(
    state: web::Data<AppState>,
    query: web::Query<ListModelsQuery>,
) -> ActixResult<web::Json<Vec<Model>>> {
    let models = state.registry.list_models(query.provider.as_deref());
    Ok(web::Json(models))
}

async fn list_providers(state: web::Data<AppState>) -> ActixResult<web::Json<Vec<ModelProvider>>> {
    Ok(web::Json(state.registry.list_providers()))
}

async fn model_info(
    state: web::Data<AppState>,
    query: web::Query<ModelInfoQuery>,
) -> Result<web::Json<Model>, LlmError> {
    Ok(web::Json(state.registry.get_model(&query.model_id)?))
}

async fn get_stats(
    state: web::Data<AppState>,
    request: web::Json<GetStatsRequest>,
) -> Result<web::Json<GetStatsResponse>, LlmError> {
    let request = request.into_inner();
    let limit = request.limit.clamp(1, 1000);
    let (stats, logs) = state
        .log_manager
        .get_logs(&request.model_key, request.start_time, request.end_time, limit)
        .await?;
    Ok(web::Json(GetStatsResponse {
        model_key: request.model_key,
        total_returned: logs.len(),
        stats,
        logs,
    }))
}

async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let uptime_seconds = (unix_now() - state.start_time).max(0.0) as u64;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "uptime": format_uptime(uptime_seconds),
        "chat_requests": state.chat_request_count.load(Ordering::Relaxed),
        "model_usage": state.model_usage.lock().clone(),
    })))
}

fn format_uptime(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, test};

    use super::*;
    use crate::config::ModelRegistry;
    use crate::metrics::LogManager;

    const CATALOG: &str = r#"
PROVIDERS:
  MOCK: {}
MODELS:
  MOCK/mock:
    internal_model_id: mock
    max_tokens: 10000
    max_output_tokens: 10000
"#;

    fn test_state(metrics_dir: &std::path::Path) -> web::Data<AppState> {
        let registry = Arc::new(ModelRegistry::from_yaml_str(CATALOG).unwrap());
        let log_manager = Arc::new(LogManager::new(metrics_dir, 100, 5));
        web::Data::new(AppState::build(registry, log_manager))
    }

    #[actix_web::test]
    async fn health_reports_status_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_state(dir.path()))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(response.status().is_success());
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["chat_requests"], 0);
    }

    #[actix_web::test]
    async fn list_models_and_providers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_state(dir.path()))
                .configure(configure_routes),
        )
        .await;

        let models: Vec<Model> = test::read_body_json(
            test::call_service(&app, test::TestRequest::post().uri("/list_models").to_request())
                .await,
        )
        .await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "MOCK/mock");

        let providers: Vec<ModelProvider> = test::read_body_json(
            test::call_service(
                &app,
                test::TestRequest::get().uri("/list_providers").to_request(),
            )
            .await,
        )
        .await;
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "MOCK");
    }

    #[actix_web::test]
    async fn model_info_misses_map_to_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_state(dir.path()))
                .configure(configure_routes),
        )
        .await;

        let found = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/model_info?model_id=MOCK/mock")
                .to_request(),
        )
        .await;
        assert!(found.status().is_success());

        let missing = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/model_info?model_id=MOCK/ghost")
                .to_request(),
        )
        .await;
        assert_eq!(missing.status().as_u16(), 404);
        let body: serde_json::Value = test::read_body_json(missing).await;
        assert_eq!(body["detail"]["error"], "model_not_found");
    }

    #[actix_web::test]
    async fn chat_with_unknown_model_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_state(dir.path()))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/chat/NOPE/ghost")
                .set_json(serde_json::json!({
                    "conversation": {"messages": [{"role": "user", "text": "hi"}]}
                }))
                .to_request(),
        )
        .await;
        assert_eq!(response.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn get_stats_returns_empty_shape_for_unknown_model() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(
            App::new()
                .app_data(test_state(dir.path()))
                .configure(configure_routes),
        )
        .await;

        let response = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/get_stats")
                .set_json(serde_json::json!({"model_key": "MOCK/mock", "limit": 10}))
                .to_request(),
        )
        .await;
        assert!(response.status().is_success());
        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["model_key"], "MOCK/mock");
        assert_eq!(body["total_returned"], 0);
        assert_eq!(body["stats"]["total_requests"], 0);
    }

    #[::core::prelude::v1::test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(61), "1m 1s");
        assert_eq!(format_uptime(90_061), "1d 1h 1m 1s");
    }
}
