//! HTTP API for predictions, model discovery, health and metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use stress_lib::{
    predictor::{list_models, BatchItem, PredictionDispatcher, PredictionResponse},
    EventPolicy, EventSink, PredictError, StressEvent, StressMetrics,
    StructuredLogger,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const BATCH_SHAPE_ERROR: &str = "Expected \"data\" field with list of sensor readings";

/// Shared application state
pub struct AppState {
    pub dispatcher: PredictionDispatcher,
    pub model_dir: PathBuf,
    pub policy: EventPolicy,
    pub events: Arc<dyn EventSink>,
    pub metrics: StressMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        dispatcher: PredictionDispatcher,
        model_dir: PathBuf,
        policy: EventPolicy,
        events: Arc<dyn EventSink>,
        logger: StructuredLogger,
    ) -> Self {
        let metrics = StressMetrics::new();
        if let Some(model) = dispatcher.model() {
            metrics.set_model(model.name(), model.classifier().kind());
        }
        Self {
            dispatcher,
            model_dir,
            policy,
            events,
            metrics,
            logger,
        }
    }

    fn model_name(&self) -> &str {
        self.dispatcher.model().map(|m| m.name()).unwrap_or("none")
    }

    /// Count a successful prediction and record a stress event if it qualifies
    fn observe(&self, response: &PredictionResponse) {
        self.metrics.inc_predictions(response.label);
        self.logger
            .log_prediction(response.label, response.confidence, self.model_name());

        if self.policy.is_stress(response.label) {
            let event = StressEvent::new(
                response.label,
                response.confidence,
                Some(response.reading.clone()),
                self.model_name(),
            );
            self.events.record(&event);
            self.metrics.inc_stress_events();
        }
    }
}

/// Error body returned to HTTP callers
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        let status = match err {
            PredictError::Validation { .. } => StatusCode::BAD_REQUEST,
            PredictError::ModelUnavailable
            | PredictError::Encode(_)
            | PredictError::Classifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %err, "Prediction failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn home(State(state): State<Arc<AppState>>) -> Json<Value> {
    let model = state
        .dispatcher
        .model()
        .map(|m| m.name().to_string())
        .unwrap_or_else(|| "not loaded".to_string());

    Json(json!({
        "message": "Stress Prediction API",
        "status": "running",
        "model": model,
        "endpoints": {
            "/predict": "POST - Predict stress level from one sensor reading",
            "/predict/batch": "POST - Predict stress levels for a list of readings",
            "/health": "GET - Check API health",
            "/models": "GET - List available models",
            "/events": "GET - Recent stress events",
            "/metrics": "GET - Prometheus metrics",
        }
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.dispatcher.is_ready(),
    }))
}

async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models = list_models(&state.model_dir).unwrap_or_else(|e| {
        error!(error = %e, dir = %state.model_dir.display(), "Failed to list models");
        Vec::new()
    });
    Json(json!({ "models": models }))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let start = Instant::now();
    let outcome = state.dispatcher.predict_one(&body);
    state
        .metrics
        .observe_prediction_latency(start.elapsed().as_secs_f64());

    match outcome {
        Ok(response) => {
            state.observe(&response);
            Ok(Json(response))
        }
        Err(e) => {
            state.metrics.inc_prediction_errors(&e);
            Err(e.into())
        }
    }
}

async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let items = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request(BATCH_SHAPE_ERROR))?;
    state.metrics.add_batch_items(items.len());

    let start = Instant::now();
    let batch = state.dispatcher.predict_many(items).map_err(|e| {
        state.metrics.inc_prediction_errors(&e);
        ApiError::from(e)
    })?;
    state
        .metrics
        .observe_prediction_latency(start.elapsed().as_secs_f64());

    for item in &batch.predictions {
        if let BatchItem::Prediction(response) = item {
            state.observe(response);
        }
    }
    info!(
        count = batch.count,
        failed = batch.predictions.iter().filter(|i| i.is_error()).count(),
        "Batch prediction complete"
    );

    Ok((StatusCode::OK, Json(batch)).into_response())
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Json<Value> {
    let events = state.events.recent(query.limit.unwrap_or(20));
    Json(json!({ "count": events.len(), "events": events }))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/models", get(models))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .route("/events", get(events))
        .route("/metrics", get(metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

