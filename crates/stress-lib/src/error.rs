//! Error types for feature encoding, prediction and replay

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a sensor reading into a schema-ordered feature vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// A schema column has no value in the reading
    #[error("missing feature column: {0}")]
    MissingField(String),

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A supplied value could not be read as a floating-point number
    #[error("field {field} cannot be converted to a number: {value}")]
    TypeCoercion { field: String, value: String },
}

/// Failure while loading or running a classifier.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("model digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("feature vector has {actual} values, model expects {expected}")]
    InputWidth { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single prediction request.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Model not loaded")]
    ModelUnavailable,

    /// Caller-supplied reading lacks required raw fields
    #[error("Missing required fields: {missing:?}")]
    Validation { missing: Vec<String> },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Failure while loading or streaming the historical dataset.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("training data file not found: {0}")]
    DatasetNotFound(PathBuf),

    #[error("dataset has no rows to replay")]
    EmptyDataset,

    #[error("dataset row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("simulator has been stopped")]
    Stopped,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
