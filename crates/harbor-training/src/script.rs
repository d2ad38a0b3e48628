//! User modules that run as a child process.

use crate::dispatch::{DispatchMode, EntryPoint};
use crate::error::TrainingResult;
use crate::install::Installer;
use crate::matcher::{Arguments, ParameterDescriptor};
use crate::module::{Model, ModuleLoader, TrainableModule};
use async_trait::async_trait;
use harbor_core::RuntimeEnvironment;
use harbor_core::mapping::{to_cmd_args, to_env_vars};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Loads the staged entry point as a [`ScriptModule`].
#[derive(Debug, Clone, Default)]
pub struct ScriptLoader {
    installer: Installer,
}

impl ScriptLoader {
    pub fn new(installer: Installer) -> Self {
        Self { installer }
    }
}

#[async_trait]
impl ModuleLoader for ScriptLoader {
    async fn load(&self, env: &RuntimeEnvironment) -> TrainingResult<Arc<dyn TrainableModule>> {
        let entry = EntryPoint::classify(env.code_dir(), env.user_entry_point());
        entry.ensure_present()?;
        entry.prepare()?;
        tracing::debug!(entry = entry.name(), kind = ?entry.kind(), "loaded entry point");

        Ok(Arc::new(ScriptModule {
            python: self.installer.python().to_string(),
            args: to_cmd_args(env.hyperparameters()),
            env: to_env_vars(env),
            entry,
        }))
    }
}

/// The user entry point executed as a subprocess.
///
/// Accepts every argument; the hyperparameters travel as command-line
/// arguments and the environment as `SAGEMAKER_*` variables. The process
/// writes its own artifacts, so training never returns a model.
#[derive(Debug, Clone)]
pub struct ScriptModule {
    entry: EntryPoint,
    python: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ScriptModule {
    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

#[async_trait]
impl TrainableModule for ScriptModule {
    fn name(&self) -> &str {
        self.entry.module_name()
    }

    fn train_parameters(&self) -> ParameterDescriptor {
        ParameterDescriptor::catch_all()
    }

    async fn train(&self, _args: Arguments) -> anyhow::Result<Option<Model>> {
        self.entry
            .invocation(&self.python, self.args.clone(), self.env.clone())
            .run(DispatchMode::Wait)
            .await?;
        Ok(None)
    }
}
