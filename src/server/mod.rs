//! HTTP boundary
//!
//! Owns the lifecycle of the registry and the metrics recorder: both are
//! constructed at startup, injected into the handlers through
//! `AppState`, and the recorder is flushed on shutdown.

mod error;
mod routes;
mod state;

pub use state::AppState;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use tracing::info;

use crate::utils::error::{LlmError, Result};

/// Run the gateway until interrupted, then flush the metrics recorder
pub async fn run_server(state: AppState, port: u16) -> Result<()> {
    let log_manager = state.log_manager.clone();
    let data = web::Data::new(state);

    info!(port, "starting gateway server");
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| LlmError::config(format!("failed to bind port {port}: {e}")))?
    .run()
    .await
    .map_err(|e| LlmError::service_call(format!("server error: {e}")))?;

    info!("server stopped, flushing metrics");
    log_manager.flush().await?;
    Ok(())
}
