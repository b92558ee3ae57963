//! Model loading and discovery
//!
//! A loaded model binds one classifier to exactly one schema. ONNX graphs do
//! not carry column names, so an optional `<stem>.schema.json` sidecar (a JSON
//! array of column names) supplies them; without it the default ordering is
//! used. Linear models carry their columns inline.

use super::{Classifier, LinearClassifier, OnnxClassifier};
use crate::error::ClassifierError;
use crate::schema::SchemaRegistry;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// File extensions recognised as loadable models
pub const MODEL_EXTENSIONS: [&str; 2] = ["onnx", "json"];

const SCHEMA_SIDECAR_SUFFIX: &str = ".schema.json";

/// A classifier together with the schema it was trained against
#[derive(Clone)]
pub struct LoadedModel {
    name: String,
    classifier: Arc<dyn Classifier>,
    schema: SchemaRegistry,
    digest: Option<String>,
}

impl LoadedModel {
    pub fn new(
        name: impl Into<String>,
        classifier: Arc<dyn Classifier>,
        schema: SchemaRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            classifier,
            schema,
            digest: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// SHA-256 of the model artifact, when loaded from disk
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("kind", &self.classifier.kind())
            .field("schema", &self.schema)
            .field("digest", &self.digest)
            .finish()
    }
}

/// Load a model file, choosing the implementation by extension.
///
/// When `expected_sha256` is given the artifact must hash to it.
pub fn load_model(path: &Path, expected_sha256: Option<&str>) -> Result<LoadedModel, ClassifierError> {
    if !path.is_file() {
        return Err(ClassifierError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    let digest = sha256_hex(&bytes);

    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(&digest) {
            return Err(ClassifierError::DigestMismatch {
                expected: expected.to_string(),
                actual: digest,
            });
        }
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let (classifier, schema): (Arc<dyn Classifier>, SchemaRegistry) = match extension.as_str() {
        "json" => {
            let linear = LinearClassifier::from_json(&bytes)?;
            let schema = linear.schema().clone();
            (Arc::new(linear), schema)
        }
        "onnx" => {
            let schema = read_schema_sidecar(path)?;
            let onnx = OnnxClassifier::new(&bytes, schema.len())?;
            (Arc::new(onnx), schema)
        }
        other => return Err(ClassifierError::UnsupportedFormat(other.to_string())),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        model = %name,
        kind = classifier.kind(),
        columns = schema.len(),
        probabilities = classifier.supports_probabilities(),
        sha256 = %digest,
        "Model loaded"
    );

    Ok(LoadedModel {
        name,
        classifier,
        schema,
        digest: Some(digest),
    })
}

fn read_schema_sidecar(model_path: &Path) -> Result<SchemaRegistry, ClassifierError> {
    let stem = model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = model_path.with_file_name(format!("{stem}{SCHEMA_SIDECAR_SUFFIX}"));

    if !sidecar.is_file() {
        debug!(path = %sidecar.display(), "No schema sidecar, using default column order");
        return Ok(SchemaRegistry::default());
    }
    let columns: Vec<String> = serde_json::from_slice(&fs::read(&sidecar)?)
        .map_err(|e| ClassifierError::InvalidModel(format!("{}: {e}", sidecar.display())))?;
    Ok(SchemaRegistry::new(columns))
}

/// Model files available in `dir`, sorted by name. A missing directory has none.
pub fn list_models(dir: &Path) -> std::io::Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut models: Vec<String> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.ends_with(SCHEMA_SIDECAR_SUFFIX))
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| MODEL_EXTENSIONS.contains(&e))
                .unwrap_or(false)
        })
        .collect();
    models.sort();
    Ok(models)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
