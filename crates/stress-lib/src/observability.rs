//! Observability infrastructure for the stress monitor
//!
//! Provides:
//! - Prometheus metrics (prediction latency, predictions by label, errors,
//!   replayed records, stress events, loaded model)
//! - Structured JSON logging with tracing

use crate::error::PredictError;
use crate::models::{Label, ReplayRecord};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<StressMetricsInner> = OnceLock::new();

struct StressMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions: IntCounterVec,
    prediction_errors: IntCounterVec,
    batch_items: IntCounter,
    replay_records: IntCounter,
    stress_events: IntCounter,
    model_info: GaugeVec,
}

impl StressMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "stress_prediction_latency_seconds",
                "Time spent encoding and classifying one reading",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions: register_int_counter_vec!(
                "stress_predictions_total",
                "Predictions produced, by predicted label",
                &["label"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "stress_prediction_errors_total",
                "Failed predictions, by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            batch_items: register_int_counter!(
                "stress_batch_items_total",
                "Readings received through batch requests"
            )
            .expect("Failed to register batch_items_total"),

            replay_records: register_int_counter!(
                "stress_replay_records_total",
                "Records emitted by the replay simulator"
            )
            .expect("Failed to register replay_records_total"),

            stress_events: register_int_counter!(
                "stress_events_total",
                "Predictions recorded as stress events"
            )
            .expect("Failed to register stress_events_total"),

            model_info: register_gauge_vec!(
                "stress_model_info",
                "Information about the currently loaded classifier",
                &["name", "kind"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Lightweight handle to the global metrics; clones share the same metrics.
#[derive(Clone)]
pub struct StressMetrics {
    _private: (),
}

impl Default for StressMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StressMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(StressMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &StressMetricsInner {
        GLOBAL_METRICS.get_or_init(StressMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, label: Label) {
        self.inner()
            .predictions
            .with_label_values(&[&label.to_string()])
            .inc();
    }

    pub fn inc_prediction_errors(&self, error: &PredictError) {
        let kind = match error {
            PredictError::ModelUnavailable => "model_unavailable",
            PredictError::Validation { .. } => "validation",
            PredictError::Encode(_) => "encode",
            PredictError::Classifier(_) => "classifier",
        };
        self.inner().prediction_errors.with_label_values(&[kind]).inc();
    }

    pub fn add_batch_items(&self, count: usize) {
        self.inner().batch_items.inc_by(count as u64);
    }

    pub fn inc_replay_records(&self) {
        self.inner().replay_records.inc();
    }

    pub fn inc_stress_events(&self) {
        self.inner().stress_events.inc();
    }

    pub fn set_model(&self, name: &str, kind: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[name, kind])
            .set(1.0);
    }
}

/// Structured logger for service events
///
/// Every line carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, model: Option<&str>) {
        match model {
            Some(model) => info!(
                event = "service_started",
                service = %self.service,
                version = %version,
                model = %model,
                "Service started"
            ),
            None => warn!(
                event = "service_started",
                service = %self.service,
                version = %version,
                "Service started without a model, predictions will fail"
            ),
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Service shutting down"
        );
    }

    pub fn log_prediction(&self, label: Label, confidence: Option<f64>, model: &str) {
        info!(
            event = "prediction_generated",
            service = %self.service,
            label = label.0,
            confidence = ?confidence,
            model = %model,
            "Generated stress prediction"
        );
    }

    pub fn log_stress_event(&self, label: Label, confidence: f64, model: &str) {
        warn!(
            event = "stress_event",
            service = %self.service,
            stress_level = label.0,
            confidence = confidence,
            model = %model,
            "Stress event recorded"
        );
    }

    pub fn log_replay_started(&self, mode: &str, rows: usize, interval_ms: u128) {
        info!(
            event = "replay_started",
            service = %self.service,
            mode = %mode,
            rows = rows,
            interval_ms = interval_ms as u64,
            "Replay started"
        );
    }

    pub fn log_replay_record(&self, record: &ReplayRecord, cycle_label: Option<Label>) {
        info!(
            event = "replay_record",
            service = %self.service,
            timestamp = %record.timestamp,
            x = record.x,
            y = record.y,
            z = record.z,
            eda = record.eda,
            hr = record.hr,
            temp = record.temp,
            cycle_label = ?cycle_label.map(|l| l.0),
            "Replayed reading"
        );
    }

    pub fn log_replay_stopped(&self, records: u64) {
        info!(
            event = "replay_stopped",
            service = %self.service,
            records = records,
            "Replay stopped"
        );
    }
}
