//! Single and batch prediction over the bound classifier
//!
//! Requests arrive as loosely typed JSON objects. Required raw fields are
//! checked before anything is encoded, so a caller's incomplete reading is
//! reported as a validation failure rather than a schema mismatch. Batch
//! requests isolate failures per item and keep input order.

use super::{FeatureEncoder, LoadedModel, Prediction};
use crate::error::PredictError;
use crate::models::{Label, SensorReading, DATETIME_FORMAT, RAW_FIELDS};
use crate::predictor::coerce_f64;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

/// Outcome of classifying one reading
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: Label,
    pub distribution: Option<Vec<f64>>,
    /// Largest class probability, when a distribution exists
    pub confidence: Option<f64>,
}

impl From<Prediction> for PredictionResult {
    fn from(prediction: Prediction) -> Self {
        let confidence = prediction
            .distribution
            .as_ref()
            .and_then(|d| d.iter().copied().reduce(f64::max));
        Self {
            label: prediction.label,
            distribution: prediction.distribution,
            confidence,
        }
    }
}

/// Wire form of a successful prediction
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub predicted_label: f64,
    pub input_data: Value,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_class_probabilities"
    )]
    pub probabilities: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip)]
    pub label: Label,
    /// Typed reading that was classified, with the datetime actually used
    #[serde(skip)]
    pub reading: SensorReading,
}

impl PredictionResponse {
    fn new(result: PredictionResult, input_data: Value, reading: SensorReading) -> Self {
        Self {
            predicted_label: result.label.as_f64(),
            input_data,
            probabilities: result.distribution,
            confidence: result.confidence,
            label: result.label,
            reading,
        }
    }
}

/// Probabilities keyed `class_<i>`, in class order
fn serialize_class_probabilities<S: Serializer>(
    probabilities: &Option<Vec<f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match probabilities {
        Some(probs) => serializer.collect_map(
            probs
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("class_{i}"), p)),
        ),
        None => serializer.serialize_none(),
    }
}

/// One slot of a batch response
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum BatchItem {
    Prediction(PredictionResponse),
    Error { error: String, input: Value },
}

impl BatchItem {
    pub fn is_error(&self) -> bool {
        matches!(self, BatchItem::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub predictions: Vec<BatchItem>,
    pub count: usize,
}

/// Routes prediction requests through the encoder and the bound classifier
#[derive(Debug, Clone, Default)]
pub struct PredictionDispatcher {
    model: Option<LoadedModel>,
    encoder: FeatureEncoder,
}

impl PredictionDispatcher {
    pub fn new(model: Option<LoadedModel>) -> Self {
        Self {
            model,
            encoder: FeatureEncoder::new(),
        }
    }

    pub fn model(&self) -> Option<&LoadedModel> {
        self.model.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    fn bound(&self) -> Result<&LoadedModel, PredictError> {
        self.model.as_ref().ok_or(PredictError::ModelUnavailable)
    }

    /// Encode a typed reading against the bound schema and classify it
    pub fn predict_reading(&self, reading: &SensorReading) -> Result<PredictionResult, PredictError> {
        let model = self.bound()?;
        let features = self.encoder.encode(reading, model.schema())?;
        let prediction = model.classifier().predict(&features)?;
        debug!(label = %prediction.label, model = model.name(), "Reading classified");
        Ok(prediction.into())
    }

    /// Predict one request body; the response echoes the sensor fields and
    /// the datetime actually used.
    pub fn predict_one(&self, body: &Value) -> Result<PredictionResponse, PredictError> {
        self.bound()?;
        let fields = as_fields(body)?;
        let reading = reading_from_fields(fields)?;
        let result = self.predict_reading(&reading)?;

        let mut echo = Map::new();
        for field in RAW_FIELDS {
            if let Some(value) = fields.get(field) {
                echo.insert(field.to_string(), value.clone());
            }
        }
        echo.insert("datetime".to_string(), Value::String(reading.datetime.clone()));

        Ok(PredictionResponse::new(result, Value::Object(echo), reading))
    }

    /// Predict every item of a batch.
    ///
    /// Fails as a whole only when no model is bound. Otherwise the output has
    /// one slot per input, in input order; malformed items become error slots
    /// carrying the original item.
    pub fn predict_many(&self, items: &[Value]) -> Result<BatchResponse, PredictError> {
        self.bound()?;

        let predictions: Vec<BatchItem> = items
            .iter()
            .map(|item| {
                let outcome = as_fields(item)
                    .and_then(reading_from_fields)
                    .and_then(|reading| Ok((self.predict_reading(&reading)?, reading)));
                match outcome {
                    Ok((result, reading)) => {
                        BatchItem::Prediction(PredictionResponse::new(result, item.clone(), reading))
                    }
                    Err(e) => BatchItem::Error {
                        error: e.to_string(),
                        input: item.clone(),
                    },
                }
            })
            .collect();

        Ok(BatchResponse {
            count: predictions.len(),
            predictions,
        })
    }
}

fn as_fields(body: &Value) -> Result<&Map<String, Value>, PredictError> {
    body.as_object().ok_or_else(|| PredictError::Validation {
        missing: RAW_FIELDS.iter().map(|f| f.to_string()).collect(),
    })
}

/// Required raw fields absent from a caller-supplied reading
pub fn missing_fields(fields: &Map<String, Value>) -> Vec<String> {
    RAW_FIELDS
        .iter()
        .filter(|f| !fields.contains_key(**f))
        .map(|f| f.to_string())
        .collect()
}

/// Build a typed reading from request fields, defaulting the datetime to now
fn reading_from_fields(fields: &Map<String, Value>) -> Result<SensorReading, PredictError> {
    let missing = missing_fields(fields);
    if !missing.is_empty() {
        return Err(PredictError::Validation { missing });
    }

    let value = |name: &str| coerce_f64(name, &fields[name]);
    let datetime = match fields.get("datetime") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => chrono::Local::now().format(DATETIME_FORMAT).to_string(),
        Some(other) => other.to_string(),
    };

    Ok(SensorReading {
        x: value("X")?,
        y: value("Y")?,
        z: value("Z")?,
        eda: value("EDA")?,
        hr: value("HR")?,
        temp: value("TEMP")?,
        datetime,
        id: fields.get("id").cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifierError, EncodeError};
    use crate::predictor::{Classifier, FeatureVector};
    use crate::schema::SchemaRegistry;
    use serde_json::json;
    use std::sync::Arc;

    /// Labels by heart rate; optionally reports a fixed distribution
    struct HeartRateClassifier {
        probabilities: bool,
    }

    impl Classifier for HeartRateClassifier {
        fn predict(&self, features: &FeatureVector) -> Result<Prediction, ClassifierError> {
            let hr = features.get("HR").unwrap_or_default();
            let label = if hr > 100.0 { Label(2) } else if hr > 80.0 { Label(1) } else { Label(0) };
            let distribution = self.probabilities.then(|| {
                let mut d = vec![0.1, 0.1, 0.1];
                d[label.0 as usize] = 0.8;
                d
            });
            Ok(Prediction { label, distribution })
        }

        fn supports_probabilities(&self) -> bool {
            self.probabilities
        }

        fn kind(&self) -> &'static str {
            "heart-rate"
        }
    }

    fn dispatcher(probabilities: bool) -> PredictionDispatcher {
        let model = LoadedModel::new(
            "heart-rate",
            Arc::new(HeartRateClassifier { probabilities }),
            SchemaRegistry::default(),
        );
        PredictionDispatcher::new(Some(model))
    }

    fn body(hr: f64) -> Value {
        json!({
            "X": -21.0, "Y": -53.0, "Z": 27.0, "EDA": 0.213944, "HR": hr, "TEMP": 30.37,
            "datetime": "2020-05-08 22:11:34"
        })
    }

    #[test]
    fn test_predict_one_with_probabilities() {
        let response = dispatcher(true).predict_one(&body(110.0)).unwrap();
        assert_eq!(response.label, Label(2));
        assert_eq!(response.predicted_label, 2.0);
        assert_eq!(response.confidence, Some(0.8));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["probabilities"]["class_2"], 0.8);
        assert_eq!(json["probabilities"]["class_0"], 0.1);
        assert_eq!(json["input_data"]["datetime"], "2020-05-08 22:11:34");
        assert_eq!(json["input_data"]["HR"], 110.0);
        assert!(json.get("label").is_none());
    }

    #[test]
    fn test_predict_one_without_probabilities_omits_fields() {
        let response = dispatcher(false).predict_one(&body(60.0)).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["predicted_label"], 0.0);
        assert!(json.get("probabilities").is_none());
        assert!(json.get("confidence").is_none());
    }

    #[test]
    fn test_batch_item_keeps_typed_reading() {
        let item = json!({"X": "1.5", "Y": 2, "Z": 3, "EDA": 0.2, "HR": "120", "TEMP": 31});
        let batch = dispatcher(false).predict_many(&[item.clone()]).unwrap();
        match &batch.predictions[0] {
            BatchItem::Prediction(response) => {
                assert_eq!(response.input_data, item);
                assert_eq!(response.reading.x, 1.5);
                assert_eq!(response.reading.hr, 120.0);
                assert_eq!(response.reading.datetime.len(), 19);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_are_validation_errors() {
        let err = dispatcher(true)
            .predict_one(&json!({"X": 1.0, "Y": 2.0, "Z": 3.0, "HR": 70.0}))
            .unwrap_err();
        match err {
            PredictError::Validation { missing } => assert_eq!(missing, vec!["EDA", "TEMP"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unbound_model_is_unavailable() {
        let dispatcher = PredictionDispatcher::new(None);
        assert!(matches!(
            dispatcher.predict_one(&body(70.0)),
            Err(PredictError::ModelUnavailable)
        ));
        assert!(matches!(
            dispatcher.predict_many(&[body(70.0)]),
            Err(PredictError::ModelUnavailable)
        ));
    }

    #[test]
    fn test_datetime_defaults_to_now() {
        let mut request = body(70.0);
        request.as_object_mut().unwrap().remove("datetime");
        let response = dispatcher(true).predict_one(&request).unwrap();
        let echoed = response.input_data["datetime"].as_str().unwrap();
        assert!(crate::predictor::parse_timestamp(echoed).is_ok());
    }

    #[test]
    fn test_bad_timestamp_surfaces_encode_error() {
        let mut request = body(70.0);
        request["datetime"] = json!("not a date");
        assert!(matches!(
            dispatcher(true).predict_one(&request),
            Err(PredictError::Encode(EncodeError::InvalidTimestamp(_)))
        ));
    }

    #[test]
    fn test_schema_mismatch_surfaces_missing_field() {
        let model = LoadedModel::new(
            "spo2",
            Arc::new(HeartRateClassifier { probabilities: false }),
            SchemaRegistry::new(["HR", "SpO2"]),
        );
        let err = PredictionDispatcher::new(Some(model))
            .predict_one(&body(70.0))
            .unwrap_err();
        assert!(matches!(err, PredictError::Encode(EncodeError::MissingField(f)) if f == "SpO2"));
    }

    #[test]
    fn test_batch_isolates_each_malformed_position() {
        let dispatcher = dispatcher(true);
        for bad in 0..4 {
            let mut items: Vec<Value> = (0..4).map(|i| body(60.0 + 20.0 * i as f64)).collect();
            items[bad].as_object_mut().unwrap().remove("EDA");

            let response = dispatcher.predict_many(&items).unwrap();
            assert_eq!(response.count, 4);
            assert_eq!(response.predictions.len(), 4);
            for (i, item) in response.predictions.iter().enumerate() {
                assert_eq!(item.is_error(), i == bad, "slot {i} with bad item {bad}");
            }
            match &response.predictions[bad] {
                BatchItem::Error { error, input } => {
                    assert!(error.contains("EDA"));
                    assert_eq!(input, &items[bad]);
                }
                BatchItem::Prediction(_) => unreachable!(),
            }
        }
    }

    #[test]
    fn test_batch_preserves_order_and_echoes_items() {
        let items = vec![body(60.0), body(90.0), body(120.0), json!("garbage")];
        let response = dispatcher(false).predict_many(&items).unwrap();
        let labels: Vec<Option<f64>> = response
            .predictions
            .iter()
            .map(|p| match p {
                BatchItem::Prediction(r) => Some(r.predicted_label),
                BatchItem::Error { .. } => None,
            })
            .collect();
        assert_eq!(labels, vec![Some(0.0), Some(1.0), Some(2.0), None]);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["count"], 4);
        assert_eq!(json["predictions"][1]["input_data"], items[1]);
        assert_eq!(json["predictions"][3]["input"], "garbage");
    }

    #[test]
    fn test_batch_coercion_failure_is_isolated() {
        let mut items = vec![body(60.0), body(60.0)];
        items[0]["TEMP"] = json!("warm");
        let response = dispatcher(false).predict_many(&items).unwrap();
        assert!(response.predictions[0].is_error());
        assert!(!response.predictions[1].is_error());
    }

    #[test]
    fn test_empty_batch() {
        let response = dispatcher(false).predict_many(&[]).unwrap();
        assert_eq!(response.count, 0);
    }
}
