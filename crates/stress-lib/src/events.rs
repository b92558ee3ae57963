//! Stress events raised from predictions
//!
//! A prediction becomes a stress event when it meets the configured policy.
//! Durable storage is an external concern; sinks here either log events or
//! keep a bounded in-memory history for the service to report.

use crate::models::{Label, SensorReading};
use crate::observability::StructuredLogger;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Events retained by [`MemoryEventSink`] by default
pub const DEFAULT_EVENT_HISTORY: usize = 100;

/// Decides which predictions count as stress events
#[derive(Debug, Clone, Copy)]
pub struct EventPolicy {
    /// Lowest label that counts as stress
    pub min_label: Label,
}

impl Default for EventPolicy {
    fn default() -> Self {
        Self { min_label: Label(1) }
    }
}

impl EventPolicy {
    pub fn is_stress(&self, label: Label) -> bool {
        label >= self.min_label
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StressEvent {
    pub stress_level: f64,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_data: Option<SensorReading>,
    pub model_name: String,
    pub recorded_at: DateTime<Utc>,
}

impl StressEvent {
    /// Confidence defaults to 1.0 for classifiers without probabilities
    pub fn new(
        label: Label,
        confidence: Option<f64>,
        sensor_data: Option<SensorReading>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            stress_level: label.as_f64(),
            confidence: confidence.unwrap_or(1.0),
            sensor_data,
            model_name: model_name.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for stress events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &StressEvent);

    /// Most recent events, newest first; sinks without history return none
    fn recent(&self, _limit: usize) -> Vec<StressEvent> {
        Vec::new()
    }
}

/// Writes each event as a structured log line
pub struct LogEventSink {
    logger: StructuredLogger,
}

impl LogEventSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

impl EventSink for LogEventSink {
    fn record(&self, event: &StressEvent) {
        self.logger.log_stress_event(
            Label(event.stress_level as u8),
            event.confidence,
            &event.model_name,
        );
    }
}

/// Keeps the latest events in memory and also logs them
pub struct MemoryEventSink {
    events: Mutex<VecDeque<StressEvent>>,
    capacity: usize,
    log: LogEventSink,
}

impl MemoryEventSink {
    pub fn new(capacity: usize, logger: StructuredLogger) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            log: LogEventSink::new(logger),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: &StressEvent) {
        self.log.record(event);
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
    }

    fn recent(&self, limit: usize) -> Vec<StressEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().rev().take(limit).cloned().collect()
    }
}
