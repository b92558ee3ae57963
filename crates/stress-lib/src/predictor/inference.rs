//! Classifier implementations
//!
//! `OnnxClassifier` runs an exported classifier through tract; the
//! `LinearClassifier` reads a small multinomial linear model from JSON and is
//! handy for edge deployments and tests.

use super::{Classifier, FeatureVector, Prediction};
use crate::error::ClassifierError;
use crate::models::Label;
use crate::schema::SchemaRegistry;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX classifier run through tract
///
/// Output 0 holds the predicted label. A second output, when the exported
/// graph has one, holds the per-class probabilities.
pub struct OnnxClassifier {
    model: TractModel,
    width: usize,
    has_probabilities: bool,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxClassifier {
    /// Load a classifier taking `width` features per row
    pub fn new(model_bytes: &[u8], width: usize) -> Result<Self, ClassifierError> {
        let model = Self::load_model(model_bytes, width)
            .map_err(|e| ClassifierError::InvalidModel(format!("{e:#}")))?;
        let has_probabilities = model.model().outputs.len() > 1;
        debug!(width, has_probabilities, "ONNX classifier loaded");

        Ok(Self {
            model,
            width,
            has_probabilities,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    fn load_model(model_bytes: &[u8], width: usize) -> TractResult<TractModel> {
        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))?
            .with_input_fact(0, f32::fact([1, width]).into())?
            .into_optimized()?
            .into_runnable()
    }

    fn features_to_tensor(&self, features: &FeatureVector) -> Result<Tensor, ClassifierError> {
        let data: Vec<f32> = features.values().iter().map(|v| *v as f32).collect();
        tract_ndarray::Array2::from_shape_vec((1, self.width), data)
            .map(Into::into)
            .map_err(|e| ClassifierError::Inference(e.to_string()))
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            total_inferences: self.inference_count.load(Ordering::Relaxed),
            slow_inferences: self.slow_inference_count.load(Ordering::Relaxed),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError> {
        if features.len() != self.width {
            return Err(ClassifierError::InputWidth {
                expected: self.width,
                actual: features.len(),
            });
        }
        let start = Instant::now();
        let input = self.features_to_tensor(features)?;

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let label = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".to_string()))
            .and_then(|t| {
                let cast = t
                    .cast_to::<i64>()
                    .map_err(|e| ClassifierError::Inference(e.to_string()))?;
                let raw = cast
                    .as_slice::<i64>()
                    .map_err(|e| ClassifierError::Inference(e.to_string()))?
                    .first()
                    .copied()
                    .ok_or_else(|| ClassifierError::Inference("empty label output".to_string()))?;
                u8::try_from(raw)
                    .map(Label)
                    .map_err(|_| ClassifierError::Inference(format!("label {raw} out of range")))
            })?;

        let distribution = match (self.has_probabilities, outputs.get(1)) {
            (true, Some(t)) => {
                let cast = t
                    .cast_to::<f32>()
                    .map_err(|e| ClassifierError::Inference(e.to_string()))?;
                let probs = cast
                    .as_slice::<f32>()
                    .map_err(|e| ClassifierError::Inference(e.to_string()))?;
                Some(probs.iter().map(|p| f64::from(*p)).collect())
            }
            _ => None,
        };

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(Prediction {
            label,
            distribution,
        })
    }

    fn supports_probabilities(&self) -> bool {
        self.has_probabilities
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}

/// Inference statistics
#[derive(Debug, Clone)]
pub struct InferenceStats {
    pub total_inferences: u64,
    pub slow_inferences: u64,
}

/// On-disk form of a linear classifier
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModelSpec {
    /// Feature columns the weights were fit against; default ordering if absent
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    pub classes: Vec<u8>,
    /// One row of weights per class
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default = "default_probabilities")]
    pub probabilities: bool,
}

fn default_probabilities() -> bool {
    true
}

/// Multinomial linear classifier: argmax of `W·x + b`, softmax for probabilities
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    schema: SchemaRegistry,
    classes: Vec<Label>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    probabilities: bool,
}

impl LinearClassifier {
    pub fn from_spec(spec: LinearModelSpec) -> Result<Self, ClassifierError> {
        let schema = spec
            .columns
            .map(SchemaRegistry::new)
            .unwrap_or_default();

        if spec.classes.is_empty() {
            return Err(ClassifierError::InvalidModel("no classes".to_string()));
        }
        if spec.weights.len() != spec.classes.len() || spec.bias.len() != spec.classes.len() {
            return Err(ClassifierError::InvalidModel(format!(
                "{} classes but {} weight rows and {} biases",
                spec.classes.len(),
                spec.weights.len(),
                spec.bias.len()
            )));
        }
        if let Some(row) = spec.weights.iter().find(|row| row.len() != schema.len()) {
            return Err(ClassifierError::InvalidModel(format!(
                "weight row has {} values for {} columns",
                row.len(),
                schema.len()
            )));
        }

        Ok(Self {
            schema,
            classes: spec.classes.into_iter().map(Label).collect(),
            weights: spec.weights,
            bias: spec.bias,
            probabilities: spec.probabilities,
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ClassifierError> {
        let spec: LinearModelSpec = serde_json::from_slice(bytes)
            .map_err(|e| ClassifierError::InvalidModel(e.to_string()))?;
        Self::from_spec(spec)
    }

    /// Schema the weights were fit against
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    fn scores(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }
}

impl Classifier for LinearClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError> {
        if features.len() != self.schema.len() {
            return Err(ClassifierError::InputWidth {
                expected: self.schema.len(),
                actual: features.len(),
            });
        }
        let scores = self.scores(features.values());
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(Prediction {
            label: self.classes[best],
            distribution: self.probabilities.then(|| softmax(&scores)),
        })
    }

    fn supports_probabilities(&self) -> bool {
        self.probabilities
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}
