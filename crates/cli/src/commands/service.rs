//! Commands that talk to a running stress-api

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, EventList, HealthResponse, ModelList, PredictRequest, PredictResponse};
use crate::output::{
    color_level, color_status, format_confidence, print_json, print_success, print_table,
    print_warning, OutputFormat,
};

/// Row for the class probability table
#[derive(Tabled, serde::Serialize)]
struct ProbabilityRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Probability")]
    probability: String,
}

/// Row for the stress events table
#[derive(Tabled, serde::Serialize)]
struct EventRow {
    #[tabled(rename = "Recorded")]
    recorded_at: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Model")]
    model: String,
}

/// Check service health
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("health").await?;

    match format {
        OutputFormat::Json => print_json(&health),
        OutputFormat::Table => {
            println!("Status: {}", color_status(&health.status));
            if health.model_loaded {
                print_success("Model loaded");
            } else {
                print_warning("Model not loaded, predictions will fail");
            }
        }
    }

    Ok(())
}

/// List model files available to the service
pub async fn models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: ModelList = client.get("models").await?;

    match format {
        OutputFormat::Json => print_json(&list),
        OutputFormat::Table => {
            if list.models.is_empty() {
                print_warning("No models found");
                return Ok(());
            }
            for model in &list.models {
                println!("{}", model);
            }
        }
    }

    Ok(())
}

/// Send one reading to `/predict`
pub async fn predict(client: &ApiClient, request: PredictRequest, format: OutputFormat) -> Result<()> {
    let response: PredictResponse = client.post("predict", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            println!("Predicted stress level: {}", color_level(response.predicted_label));
            if let Some(confidence) = response.confidence {
                println!("Confidence: {}", format_confidence(confidence));
            }
            if let Some(datetime) = response.input_data.get("datetime").and_then(|d| d.as_str()) {
                println!("Datetime: {}", datetime);
            }
            if let Some(probabilities) = &response.probabilities {
                let rows: Vec<ProbabilityRow> = probabilities
                    .iter()
                    .map(|(class, p)| ProbabilityRow {
                        class: class.clone(),
                        probability: format!("{:.4}", p),
                    })
                    .collect();
                println!();
                print_table(&rows, format);
            }
        }
    }

    Ok(())
}

/// Show recent stress events recorded by the service
pub async fn events(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let list: EventList = client.get(&format!("events?limit={}", limit)).await?;

    match format {
        OutputFormat::Json => print_json(&list),
        OutputFormat::Table => {
            if list.events.is_empty() {
                print_warning("No stress events recorded");
                return Ok(());
            }
            let rows: Vec<EventRow> = list
                .events
                .iter()
                .map(|e| EventRow {
                    recorded_at: format_timestamp(&e.recorded_at),
                    level: color_level(e.stress_level),
                    confidence: format_confidence(e.confidence),
                    model: e.model_name.clone(),
                })
                .collect();
            print_table(&rows, format);
            println!("\nTotal: {} events", list.count);
        }
    }

    Ok(())
}

/// Shorten an RFC 3339 timestamp for display
fn format_timestamp(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| ts.to_string())
}
