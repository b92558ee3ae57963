//! Service configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Service configuration, read from `STRESS_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding model files
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Model file name inside `model_dir`
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Full model path; takes precedence over `model_dir`/`model_name`
    #[serde(default)]
    pub model_path: Option<String>,

    /// Expected SHA-256 of the model file
    #[serde(default)]
    pub model_sha256: Option<String>,

    /// Lowest predicted label recorded as a stress event
    #[serde(default = "default_event_threshold")]
    pub event_threshold: u8,

    /// Stress events kept for `GET /events`
    #[serde(default = "default_event_history")]
    pub event_history: usize,
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000)
}

fn default_model_dir() -> String {
    std::env::var("MODEL_DIR").unwrap_or_else(|_| "models".to_string())
}

fn default_model_name() -> String {
    std::env::var("MODEL_NAME").unwrap_or_else(|_| "random_forest.onnx".to_string())
}

fn default_event_threshold() -> u8 {
    1
}

fn default_event_history() -> usize {
    stress_lib::events::DEFAULT_EVENT_HISTORY
}

impl ApiConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder().add_source(config::Environment::with_prefix("STRESS")),
        )
    }

    pub fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()?
            .try_deserialize()
            .context("Invalid STRESS_* configuration")
    }

    pub fn model_dir(&self) -> PathBuf {
        PathBuf::from(&self.model_dir)
    }

    /// Model file the service loads at startup
    pub fn model_path(&self) -> PathBuf {
        match &self.model_path {
            Some(path) => PathBuf::from(path),
            None => self.model_dir().join(&self.model_name),
        }
    }
}
