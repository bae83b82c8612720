//! Gateway binary

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use llmserv_rs::config::ModelRegistry;
use llmserv_rs::metrics::LogManager;
use llmserv_rs::server::{AppState, run_server};
use llmserv_rs::utils::logging;

#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Multi-provider LLM gateway")]
struct Args {
    /// Port to listen on
    #[arg(long, env = "API_PORT", default_value_t = 9999)]
    port: u16,

    /// Path to the model catalog
    #[arg(long, env = "LLM_MODELS_PATH", default_value = "config/models.yaml")]
    models: String,

    /// Directory for archived metrics
    #[arg(long, env = "LLM_METRICS_DIR", default_value = "metrics")]
    metrics_dir: String,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let registry = Arc::new(
        ModelRegistry::from_yaml_file(&args.models).context("failed to load model catalog")?,
    );
    let log_manager = Arc::new(LogManager::new(&args.metrics_dir, 1000, 100));
    let state = AppState::build(registry, log_manager);

    run_server(state, args.port).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
