//! The contract between the training engine and user code.

use crate::error::{TrainingError, TrainingResult};
use crate::matcher::{Arguments, ParameterDescriptor};
use async_trait::async_trait;
use harbor_core::RuntimeEnvironment;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File written by the default save convention.
pub const SAVED_MODEL_FILE: &str = "saved_model";

/// Whatever a training function hands back.
#[derive(Clone)]
pub enum Model {
    /// A model representable as JSON, persisted by the default save convention.
    Json(Value),
    /// Any other object. Only the module's own `save` can persist it.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Model {
    /// JSON truthiness: null, false, 0, "" and empty containers are falsy.
    /// Opaque models are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Json(value) => is_truthy(value),
            Self::Opaque(_) => true,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Opaque(_) => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(inner) => inner.downcast_ref(),
            Self::Json(_) => None,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<Value> for Model {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Optional operations a module implements, probed once at load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCapabilities {
    pub save: bool,
}

/// A loaded user module.
#[async_trait]
pub trait TrainableModule: Send + Sync {
    fn name(&self) -> &str;

    /// Parameters of the training function.
    fn train_parameters(&self) -> ParameterDescriptor;

    /// Runs training with the matched arguments.
    async fn train(&self, args: Arguments) -> anyhow::Result<Option<Model>>;

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::default()
    }

    /// Persists `model` into `model_dir`. Only called when
    /// [`ModuleCapabilities::save`] is set.
    async fn save(&self, _model: &Model, _model_dir: &Path) -> anyhow::Result<()> {
        anyhow::bail!("module '{}' does not implement save", self.name())
    }
}

/// Writes a JSON model to `model_dir/saved_model`.
///
/// Returns `None` for opaque models, which have no default representation.
pub fn default_save(model: &Model, model_dir: &Path) -> TrainingResult<Option<PathBuf>> {
    let Some(value) = model.as_json() else {
        tracing::warn!(
            "training returned a model without a save function; \
             it must be persisted by the module itself"
        );
        return Ok(None);
    };
    std::fs::create_dir_all(model_dir)?;
    let path = model_dir.join(SAVED_MODEL_FILE);
    std::fs::write(&path, serde_json::to_vec(value)?)?;
    tracing::info!(path = %path.display(), "saved model");
    Ok(Some(path))
}

/// Resolves the user module of a job ("import").
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, env: &RuntimeEnvironment) -> TrainingResult<Arc<dyn TrainableModule>>;
}

/// In-process modules keyed by module name.
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn TrainableModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn TrainableModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    #[must_use]
    pub fn with(mut self, module: impl TrainableModule + 'static) -> Self {
        self.register(Arc::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TrainableModule>> {
        self.modules.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, env: &RuntimeEnvironment) -> TrainingResult<Arc<dyn TrainableModule>> {
        self.get(env.module_name())
            .ok_or_else(|| {
                TrainingError::ImportModule(format!("no module named '{}'", env.module_name()))
            })
    }
}

type TrainFn = dyn Fn(Arguments) -> anyhow::Result<Option<Model>> + Send + Sync;
type SaveFn = dyn Fn(&Model, &Path) -> anyhow::Result<()> + Send + Sync;

/// A module built from plain functions.
pub struct FnModule {
    name: String,
    parameters: ParameterDescriptor,
    train: Box<TrainFn>,
    save: Option<Box<SaveFn>>,
}

impl FnModule {
    pub fn new(
        name: impl Into<String>,
        parameters: ParameterDescriptor,
        train: impl Fn(Arguments) -> anyhow::Result<Option<Model>> + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), parameters, train: Box::new(train), save: None }
    }

    #[must_use]
    pub fn with_save(
        mut self,
        save: impl Fn(&Model, &Path) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.save = Some(Box::new(save));
        self
    }
}

#[async_trait]
impl TrainableModule for FnModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn train_parameters(&self) -> ParameterDescriptor {
        self.parameters.clone()
    }

    async fn train(&self, args: Arguments) -> anyhow::Result<Option<Model>> {
        (self.train)(args)
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities { save: self.save.is_some() }
    }

    async fn save(&self, model: &Model, model_dir: &Path) -> anyhow::Result<()> {
        match &self.save {
            Some(save) => save(model, model_dir),
            None => anyhow::bail!("module '{}' does not implement save", self.name),
        }
    }
}
