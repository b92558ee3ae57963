//! Core data models for sensor telemetry and predictions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp layout accepted on requests and written for defaulted readings
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp layout of replayed records (microsecond precision)
pub const REPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Names of the six raw sensor fields, in their canonical order
pub const RAW_FIELDS: [&str; 6] = ["X", "Y", "Z", "EDA", "HR", "TEMP"];

/// Class label predicted by a classifier (stress level 0, 1, 2 in practice)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u8);

impl Label {
    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }

    /// Convert a numeric label as stored in datasets and model outputs ("1.0", 2, ...)
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&value) {
            return None;
        }
        Some(Self(value as u8))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One wearable sensor sample
///
/// `datetime` is kept as supplied and parsed when the reading is encoded,
/// so an unparseable value surfaces as an encoding failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    #[serde(rename = "EDA")]
    pub eda: f64,
    #[serde(rename = "HR")]
    pub hr: f64,
    #[serde(rename = "TEMP")]
    pub temp: f64,
    pub datetime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

impl SensorReading {
    /// Raw sensor values paired with their field names, in canonical order
    pub fn raw_fields(&self) -> [(&'static str, f64); 6] {
        [
            ("X", self.x),
            ("Y", self.y),
            ("Z", self.z),
            ("EDA", self.eda),
            ("HR", self.hr),
            ("TEMP", self.temp),
        ]
    }
}

/// Historical reading with its ground-truth class
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledReading {
    pub reading: SensorReading,
    pub label: Label,
}

/// Record emitted by the replay simulator on every advance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    #[serde(rename = "EDA")]
    pub eda: f64,
    #[serde(rename = "HR")]
    pub hr: f64,
    #[serde(rename = "TEMP")]
    pub temp: f64,
    pub timestamp: String,
}
