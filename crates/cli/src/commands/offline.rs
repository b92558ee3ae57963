//! Offline prediction over a CSV file

use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stress_lib::predictor::{load_model, BatchItem, LoadedModel, PredictionDispatcher};
use tabled::Tabled;
use tracing::warn;

use crate::output::{color_level, print_info, print_success, print_table, print_warning, OutputFormat};

/// Column holding the ground-truth label, never passed to the model
const TARGET_COLUMN: &str = "label";

/// Per-label counts of a finished run
#[derive(Debug, Default)]
pub struct CsvSummary {
    pub rows: usize,
    pub failed: usize,
    pub by_label: BTreeMap<String, usize>,
    pub probability_columns: usize,
}

#[derive(Tabled, serde::Serialize)]
struct SummaryRow {
    #[tabled(rename = "Predicted Label")]
    label: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// Default output path: `<input stem>_predictions.csv` beside the input
pub fn default_output_path(csv: &Path) -> PathBuf {
    let stem = csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    csv.with_file_name(format!("{stem}_predictions.csv"))
}

pub fn predict_csv(
    model_path: &Path,
    csv: &Path,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!("Loading model: {}", model_path.display()));
    let model = load_model(model_path, None)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;

    print_info(&format!("Reading input data: {}", csv.display()));
    let output = output.unwrap_or_else(|| default_output_path(csv));
    let summary = predict_file(model, csv, &output)?;

    print_success(&format!("Predictions saved to: {}", output.display()));
    println!("Total predictions: {}", summary.rows - summary.failed);
    if summary.failed > 0 {
        print_warning(&format!("{} rows could not be predicted", summary.failed));
    }

    println!("\nPrediction summary:");
    let rows: Vec<SummaryRow> = summary
        .by_label
        .iter()
        .map(|(label, count)| SummaryRow {
            label: label.parse().map(color_level).unwrap_or_else(|_| label.clone()),
            count: *count,
        })
        .collect();
    print_table(&rows, format);

    if summary.probability_columns > 0 {
        println!(
            "\nProbability columns added: {} classes",
            summary.probability_columns
        );
    }
    Ok(())
}

/// Predict every row of `input` and write the rows plus predictions to `output`
pub fn predict_file(model: LoadedModel, input: &Path, output: &Path) -> Result<CsvSummary> {
    let mut reader =
        csv::Reader::from_path(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read CSV row")?;
        let mut fields = Map::new();
        for (name, raw) in headers.iter().zip(record.iter()) {
            if name == TARGET_COLUMN {
                continue;
            }
            fields.insert(name.to_string(), cell_value(raw));
        }
        items.push(Value::Object(fields));
        records.push(record);
    }

    let dispatcher = PredictionDispatcher::new(Some(model));
    let batch = dispatcher.predict_many(&items)?;

    let probability_columns = batch
        .predictions
        .iter()
        .find_map(|item| match item {
            BatchItem::Prediction(p) => p.probabilities.as_ref().map(Vec::len),
            BatchItem::Error { .. } => None,
        })
        .unwrap_or(0);

    let mut writer =
        csv::Writer::from_path(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut header_row: Vec<String> = headers.iter().map(str::to_string).collect();
    header_row.push("predicted_label".to_string());
    header_row.extend((0..probability_columns).map(|i| format!("prob_class_{i}")));
    writer.write_record(&header_row)?;

    let mut summary = CsvSummary {
        rows: records.len(),
        probability_columns,
        ..Default::default()
    };
    for (i, (record, item)) in records.iter().zip(&batch.predictions).enumerate() {
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        match item {
            BatchItem::Prediction(p) => {
                let label = p.label.to_string();
                *summary.by_label.entry(label.clone()).or_default() += 1;
                row.push(label);
                let probs = p.probabilities.as_deref().unwrap_or_default();
                row.extend((0..probability_columns).map(|c| {
                    probs.get(c).map(|v| v.to_string()).unwrap_or_default()
                }));
            }
            BatchItem::Error { error, .. } => {
                warn!(row = i + 1, error = %error, "Row not predicted");
                summary.failed += 1;
                row.extend(std::iter::repeat(String::new()).take(probability_columns + 1));
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(summary)
}

/// Numeric cells become JSON numbers, anything else stays a string
fn cell_value(raw: &str) -> Value {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stress_lib::predictor::{LinearClassifier, LinearModelSpec};
    use stress_lib::SchemaRegistry;
    use tempfile::TempDir;

    fn heart_rate_model() -> LoadedModel {
        let hr = |w: f64| {
            let mut row = vec![0.0; 11];
            row[4] = w;
            row
        };
        let classifier = LinearClassifier::from_spec(LinearModelSpec {
            columns: None,
            classes: vec![0, 1, 2],
            weights: vec![hr(0.0), hr(1.0), hr(2.0)],
            bias: vec![0.0, -80.0, -200.0],
            probabilities: true,
        })
        .unwrap();
        LoadedModel::new("heart_rate.json", Arc::new(classifier), SchemaRegistry::default())
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("data/test.csv")),
            PathBuf::from("data/test_predictions.csv")
        );
    }

    #[test]
    fn test_predict_file_appends_columns() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("readings.csv");
        std::fs::write(
            &input,
            "X,Y,Z,EDA,HR,TEMP,datetime,label\n\
             -21,-53,27,0.213944,75.07,30.37,2020-05-08 22:11:34,0\n\
             1,2,3,0.5,95,31,2020-05-08 22:11:35,1\n\
             1,2,3,0.5,130,31,not-a-date,2\n\
             1,2,3,0.5,130,31,2020-05-08 22:11:36,2\n",
        )
        .unwrap();
        let output = dir.path().join("out.csv");

        let summary = predict_file(heart_rate_model(), &input, &output).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.probability_columns, 3);
        assert_eq!(summary.by_label.get("0"), Some(&1));
        assert_eq!(summary.by_label.get("1"), Some(&1));
        assert_eq!(summary.by_label.get("2"), Some(&1));

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.get(8), Some("predicted_label"));
        assert_eq!(headers.get(11), Some("prob_class_2"));

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].get(8), Some("0"));
        assert_eq!(rows[2].get(8), Some(""));
        assert_eq!(rows[3].get(8), Some("2"));
    }

    #[test]
    fn test_cell_value() {
        assert_eq!(cell_value("75.07"), serde_json::json!(75.07));
        assert_eq!(cell_value("2020-05-08"), serde_json::json!("2020-05-08"));
    }
}
