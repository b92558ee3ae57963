//! Core library for wearable stress monitoring
//!
//! This crate provides the core functionality for:
//! - Encoding sensor readings into schema-ordered feature vectors
//! - Classifier loading and stress-level prediction
//! - Replaying historical telemetry as a live stream
//! - Stress events, metrics and structured logging

pub mod error;
pub mod events;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod replay;
pub mod schema;

pub use error::{ClassifierError, EncodeError, PredictError, ReplayError};
pub use events::{EventPolicy, EventSink, LogEventSink, MemoryEventSink, StressEvent};
pub use models::*;
pub use observability::{StressMetrics, StructuredLogger};
pub use schema::SchemaRegistry;
