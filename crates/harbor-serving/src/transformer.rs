use crate::content::{DEFAULT_CONTENT_TYPE, Encoded};
use crate::error::{ServingError, ServingResult};
use crate::module::ServingModule;
use harbor_training::Model;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Runs the inference pipeline against a model loaded once.
pub struct Transformer {
    module: Arc<dyn ServingModule>,
    model_dir: PathBuf,
    model: OnceLock<Model>,
    init_lock: Mutex<()>,
}

impl Transformer {
    pub fn new(module: Arc<dyn ServingModule>, model_dir: impl Into<PathBuf>) -> Self {
        Self {
            module,
            model_dir: model_dir.into(),
            model: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Loads the model through `model_fn`. Later calls are no-ops.
    pub fn initialize(&self) -> ServingResult<()> {
        let _guard = self
            .init_lock
            .lock()
            .map_err(|_| ServingError::Internal(anyhow::anyhow!("init lock poisoned")))?;
        if self.model.get().is_some() {
            return Ok(());
        }
        tracing::info!(model_dir = %self.model_dir.display(), "loading model");
        let model = self.module.model_fn(&self.model_dir).map_err(ServingError::ModelLoad)?;
        let _ = self.model.set(model);
        tracing::info!("model loaded");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    /// `input_fn`, `predict_fn`, `output_fn`.
    ///
    /// A missing content type or accept header means JSON.
    pub fn transform(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> ServingResult<Encoded> {
        let model = self.model.get().ok_or(ServingError::ModelNotLoaded)?;
        let content_type =
            content_type.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_CONTENT_TYPE);
        let accept = accept.filter(|s| !s.trim().is_empty()).unwrap_or(DEFAULT_CONTENT_TYPE);

        let input = self.module.input_fn(body, content_type)?;
        let prediction = self.module.predict_fn(input, model).map_err(ServingError::from_user)?;
        self.module.output_fn(&prediction, accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{CSV, JSON, Payload};
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Doubler {
        loads: AtomicUsize,
    }

    impl ServingModule for Doubler {
        fn model_fn(&self, _model_dir: &Path) -> anyhow::Result<Model> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Model::Json(json!({"factor": 2})))
        }

        fn predict_fn(&self, input: Payload, model: &Model) -> anyhow::Result<Value> {
            let factor = model.as_json().and_then(|m| m["factor"].as_i64()).unwrap_or(1);
            let rows = input.as_json().and_then(Value::as_array).cloned().unwrap_or_default();
            Ok(rows.iter().map(|v| json!(v.as_i64().unwrap_or(0) * factor)).collect())
        }
    }

    #[test]
    fn test_transform_requires_model() {
        let transformer = Transformer::new(Arc::new(Doubler::default()), "/unused");
        assert!(!transformer.is_ready());
        let result = transformer.transform(b"[1]", None, None);
        assert!(matches!(result, Err(ServingError::ModelNotLoaded)));
    }

    #[test]
    fn test_initialize_loads_once() {
        let module = Arc::new(Doubler::default());
        let transformer = Transformer::new(module.clone(), "/unused");
        transformer.initialize().unwrap();
        transformer.initialize().unwrap();
        assert!(transformer.is_ready());
        assert_eq!(module.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defaults_to_json() {
        let transformer = Transformer::new(Arc::new(Doubler::default()), "/unused");
        transformer.initialize().unwrap();

        let encoded = transformer.transform(b"[1, 2, 3]", None, Some("")).unwrap();
        assert_eq!(encoded.content_type, JSON);
        assert_eq!(encoded.body, b"[2,4,6]");

        let encoded = transformer.transform(b"[5]", Some(JSON), Some(CSV)).unwrap();
        assert_eq!(encoded.body, b"10\n");
    }
}
