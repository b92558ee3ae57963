//! Historical labeled telemetry used as the replay source

use crate::error::ReplayError;
use crate::models::{Label, LabeledReading, SensorReading};
use crate::predictor::parse_timestamp;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// CSV row layout; extra columns (an index column, `id`, ...) are ignored
#[derive(Debug, Deserialize)]
struct DatasetRow {
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Z")]
    z: f64,
    #[serde(rename = "EDA")]
    eda: f64,
    #[serde(rename = "HR")]
    hr: f64,
    #[serde(rename = "TEMP")]
    temp: f64,
    #[serde(default)]
    datetime: Option<String>,
    label: f64,
}

/// Immutable, ordered set of labeled readings with a per-label index
#[derive(Debug, Clone, Default)]
pub struct HistoricalDataset {
    rows: Vec<LabeledReading>,
    by_label: BTreeMap<Label, Vec<usize>>,
}

impl HistoricalDataset {
    pub fn from_rows(rows: Vec<LabeledReading>) -> Self {
        let mut by_label: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for (i, row) in rows.iter().enumerate() {
            by_label.entry(row.label).or_default().push(i);
        }
        Self { rows, by_label }
    }

    /// Load a CSV with `X,Y,Z,EDA,HR,TEMP,datetime,label` columns
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        if !path.is_file() {
            return Err(ReplayError::DatasetNotFound(path.to_path_buf()));
        }
        info!(path = %path.display(), "Loading historical dataset");

        let mut reader = csv::Reader::from_path(path)?;
        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<DatasetRow>().enumerate() {
            let row = record?;
            let label = Label::from_f64(row.label).ok_or_else(|| ReplayError::InvalidRow {
                row: i + 1,
                message: format!("label {} is not a class index", row.label),
            })?;
            rows.push(LabeledReading {
                reading: SensorReading {
                    x: row.x,
                    y: row.y,
                    z: row.z,
                    eda: row.eda,
                    hr: row.hr,
                    temp: row.temp,
                    datetime: row.datetime.unwrap_or_default(),
                    id: None,
                },
                label,
            });
        }

        let dataset = Self::from_rows(rows);
        info!(rows = dataset.len(), labels = ?dataset.labels(), "Dataset loaded");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&LabeledReading> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[LabeledReading] {
        &self.rows
    }

    /// The closed label set, ascending
    pub fn labels(&self) -> Vec<Label> {
        self.by_label.keys().copied().collect()
    }

    /// Row indices carrying `label`, in dataset order
    pub fn indices_for(&self, label: Label) -> &[usize] {
        self.by_label.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Timestamp of the first row, if it parses
    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows
            .first()
            .and_then(|row| parse_timestamp(&row.reading.datetime).ok())
    }
}
