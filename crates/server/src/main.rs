//! Stress API - stress-level prediction service
//!
//! Loads one classifier at startup and serves predictions over HTTP. A
//! missing or broken model is logged and the service still starts, answering
//! prediction requests with an error until restarted with a usable model.

use anyhow::Result;
use std::sync::Arc;
use stress_api::{api, config::ApiConfig};
use stress_lib::{
    predictor::{load_model, PredictionDispatcher},
    EventPolicy, Label, MemoryEventSink, StructuredLogger,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting stress-api");

    let config = ApiConfig::load()?;
    let model_path = config.model_path();
    info!(port = config.port, model = %model_path.display(), "Service configured");

    let model = match load_model(&model_path, config.model_sha256.as_deref()) {
        Ok(model) => Some(model),
        Err(e) => {
            error!(error = %e, path = %model_path.display(), "Failed to load model");
            None
        }
    };

    let logger = StructuredLogger::new("stress-api");
    logger.log_startup(SERVICE_VERSION, model.as_ref().map(|m| m.name()));

    let events = Arc::new(MemoryEventSink::new(config.event_history, logger.clone()));
    let state = Arc::new(api::AppState::new(
        PredictionDispatcher::new(model),
        config.model_dir(),
        EventPolicy {
            min_label: Label(config.event_threshold),
        },
        events,
        logger.clone(),
    ));

    let shutdown_logger = logger.clone();
    api::serve(config.port, state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
