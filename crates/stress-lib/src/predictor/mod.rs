//! Stress-level prediction engine

mod dispatcher;
mod features;
mod inference;
mod loader;

pub use dispatcher::{
    BatchItem, BatchResponse, PredictionDispatcher, PredictionResponse, PredictionResult,
};
pub use features::{coerce_f64, parse_timestamp, FeatureEncoder, FeatureVector};
pub use inference::{InferenceStats, LinearClassifier, LinearModelSpec, OnnxClassifier};
pub use loader::{list_models, load_model, sha256_hex, LoadedModel, MODEL_EXTENSIONS};

use crate::error::ClassifierError;
use crate::models::Label;

/// Output of one classifier call
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// Per-class probabilities, indexed by class position
    pub distribution: Option<Vec<f64>>,
}

/// Capability interface over an opaque trained classifier
///
/// Whether a distribution is produced is fixed when the classifier is
/// loaded; `supports_probabilities` reports it without running inference.
/// One call is one inference: implementations neither retry nor cache.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError>;

    fn supports_probabilities(&self) -> bool;

    /// Short name of the implementation, for logs and the service banner
    fn kind(&self) -> &'static str;
}
