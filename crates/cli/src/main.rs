//! Stress Monitor CLI
//!
//! A command-line tool for replaying historical sensor data, running offline
//! predictions over CSV files, and querying a running stress-api.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{offline, service, simulate};
use std::path::PathBuf;
use std::time::Duration;
use stress_lib::replay::{ReplayConfig, DEFAULT_CYCLE_PERIOD, DEFAULT_LOG_CAPACITY, DEFAULT_LOG_FILE};
use stress_lib::Label;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Stress Monitor CLI
#[derive(Parser)]
#[command(name = "stressctl")]
#[command(author, version, about = "CLI for the Stress Monitor sensor replay and prediction service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via STRESS_API_URL env var)
    #[arg(long, env = "STRESS_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a labeled dataset as a live sensor stream
    Simulate {
        /// Labeled dataset CSV
        #[arg(long, default_value = "balanced_data.csv")]
        dataset: PathBuf,

        /// Seconds between readings
        #[arg(long, default_value_t = 1.0)]
        interval: f64,

        /// Replay only rows with this stress level
        #[arg(long)]
        stress_level: Option<u8>,

        /// Rotate through stress levels every cycle period
        #[arg(long)]
        cycle: bool,

        /// Readings per stress level before rotating
        #[arg(long, default_value_t = DEFAULT_CYCLE_PERIOD)]
        cycle_period: u64,

        /// Walk rows in order instead of sampling at random
        #[arg(long)]
        sequential: bool,

        /// Seed for random sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Reading log file
        #[arg(long, default_value = DEFAULT_LOG_FILE)]
        output: PathBuf,

        /// Readings kept in the log
        #[arg(long, default_value_t = DEFAULT_LOG_CAPACITY)]
        capacity: usize,

        /// Stop after this many readings
        #[arg(long)]
        count: Option<u64>,
    },

    /// Predict every row of a CSV file with a local model
    PredictCsv {
        /// Model file name
        #[arg(long)]
        model: String,

        /// Directory holding model files
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,

        /// Input CSV
        #[arg(long)]
        csv: PathBuf,

        /// Output CSV (default: <input>_predictions.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Send one reading to the service
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: f64,
        #[arg(long)]
        eda: f64,
        #[arg(long)]
        hr: f64,
        #[arg(long)]
        temp: f64,

        /// Reading time, "YYYY-MM-DD HH:MM:SS" (service time if omitted)
        #[arg(long)]
        datetime: Option<String>,
    },

    /// Check service health
    Health,

    /// List models available to the service
    Models,

    /// Show recent stress events recorded by the service
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Empty the reading log
    Clear {
        /// Reading log file
        #[arg(long, default_value = DEFAULT_LOG_FILE)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().compact())
        .init();

    match cli.command {
        Commands::Simulate {
            dataset,
            interval,
            stress_level,
            cycle,
            cycle_period,
            sequential,
            seed,
            output,
            capacity,
            count,
        } => {
            let config = ReplayConfig {
                dataset,
                label: stress_level.map(Label),
                cycle,
                sequential,
                cycle_period,
                seed,
                interval: Duration::from_secs_f64(interval.max(0.001)),
                log_path: output,
                log_capacity: capacity,
                ..Default::default()
            };
            simulate::simulate(config, count).await?;
        }
        Commands::PredictCsv {
            model,
            model_dir,
            csv,
            output,
        } => {
            offline::predict_csv(&model_dir.join(model), &csv, output, cli.format)?;
        }
        Commands::Predict {
            x,
            y,
            z,
            eda,
            hr,
            temp,
            datetime,
        } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            let request = client::PredictRequest {
                x,
                y,
                z,
                eda,
                hr,
                temp,
                datetime,
            };
            service::predict(&client, request, cli.format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&cli.api_url)?;
            service::health(&client, cli.format).await?;
        }
        Commands::Models => {
            let client = client::ApiClient::new(&cli.api_url)?;
            service::models(&client, cli.format).await?;
        }
        Commands::Events { limit } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            service::events(&client, limit, cli.format).await?;
        }
        Commands::Clear { output } => {
            simulate::clear(&output)?;
        }
    }

    Ok(())
}
