//! The four-function inference contract.

use crate::content::{self, Encoded, Payload};
use crate::error::ServingResult;
use harbor_training::Model;
use harbor_training::module::SAVED_MODEL_FILE;
use serde_json::Value;
use std::path::Path;

/// User inference code.
///
/// Only `predict_fn` is required. The defaults load the JSON model written by
/// the training default save convention and handle JSON and CSV bodies.
pub trait ServingModule: Send + Sync {
    /// Loads the model. Called once per worker.
    fn model_fn(&self, model_dir: &Path) -> anyhow::Result<Model> {
        default_model_fn(model_dir)
    }

    fn input_fn(&self, body: &[u8], content_type: &str) -> ServingResult<Payload> {
        content::decode(body, content_type)
    }

    fn predict_fn(&self, input: Payload, model: &Model) -> anyhow::Result<Value>;

    fn output_fn(&self, prediction: &Value, accept: &str) -> ServingResult<Encoded> {
        content::encode(prediction, accept)
    }
}

/// Reads `model_dir/saved_model` as JSON.
pub fn default_model_fn(model_dir: &Path) -> anyhow::Result<Model> {
    let path = model_dir.join(SAVED_MODEL_FILE);
    let bytes = std::fs::read(&path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    Ok(Model::Json(serde_json::from_slice(&bytes)?))
}
