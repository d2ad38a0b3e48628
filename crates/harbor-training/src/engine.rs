//! The training engine.
//!
//! Runs one job: fetch and install the user code, load it, call its training
//! function with the arguments it asks for, persist the model and record the
//! outcome for the orchestrator.

use crate::error::{TrainingError, TrainingResult};
use crate::fetch::fetch_and_install;
use crate::install::{InstallPolicy, Installer};
use crate::matcher::{Arguments, matching_args};
use crate::metrics::MetricsAgent;
use crate::module::{ModuleLoader, default_save};
use crate::storage::{HttpObjectStore, ObjectStore};
use harbor_core::sentinel::{write_failure, write_success};
use harbor_core::{ProcessEnv, RuntimeEnvironment};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    FetchingCode,
    Importing,
    Invoking,
    Saving,
    Success,
    Failed,
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FetchingCode => "fetching-code",
            Self::Importing => "importing",
            Self::Invoking => "invoking",
            Self::Saving => "saving",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of [`TrainingEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingReport {
    /// `Success` or `Failed`.
    pub state: TrainingState,
    /// State the job was in when it failed.
    pub failed_in: Option<TrainingState>,
    pub exit_code: i32,
    /// Contents of the failure record, if one was written.
    pub failure: Option<String>,
}

impl TrainingReport {
    pub fn succeeded(&self) -> bool {
        self.state == TrainingState::Success
    }
}

pub struct TrainingEngine {
    env: RuntimeEnvironment,
    loader: Arc<dyn ModuleLoader>,
    store: Arc<dyn ObjectStore>,
    installer: Installer,
    install_policy: InstallPolicy,
    metrics_agent: Option<MetricsAgent>,
    state: TrainingState,
}

impl TrainingEngine {
    pub fn new(env: RuntimeEnvironment, loader: Arc<dyn ModuleLoader>) -> Self {
        let store = Arc::new(HttpObjectStore::new(env.region().map(str::to_string)));
        Self {
            env,
            loader,
            store,
            installer: Installer::from_vars(&ProcessEnv),
            install_policy: InstallPolicy::Auto,
            metrics_agent: Some(MetricsAgent::default()),
            state: TrainingState::Idle,
        }
    }

    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_installer(mut self, installer: Installer) -> Self {
        self.installer = installer;
        self
    }

    #[must_use]
    pub fn with_install_policy(mut self, policy: InstallPolicy) -> Self {
        self.install_policy = policy;
        self
    }

    /// Replaces the metrics agent. `None` never starts one.
    #[must_use]
    pub fn with_metrics_agent(mut self, agent: Option<MetricsAgent>) -> Self {
        self.metrics_agent = agent;
        self
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    pub fn environment(&self) -> &RuntimeEnvironment {
        &self.env
    }

    /// Runs the job and writes the success or failure record.
    ///
    /// Never returns an error: every failure ends in `TrainingState::Failed`
    /// with a failure record and a non-zero exit code.
    pub async fn run(&mut self) -> TrainingReport {
        tracing::info!(
            "Training environment:\n{}",
            serde_json::to_string_pretty(&self.env.to_mapping()).unwrap_or_default()
        );

        // Held until the engine is done; the agent dies with the process.
        let _metrics = if self.env.enable_metrics() {
            self.metrics_agent.as_ref().and_then(MetricsAgent::start)
        } else {
            None
        };

        match self.execute().await {
            Ok(()) => match write_success(self.env.paths(), None) {
                Ok(_) => {
                    self.transition(TrainingState::Success);
                    tracing::info!("Reporting training SUCCESS");
                    TrainingReport {
                        state: TrainingState::Success,
                        failed_in: None,
                        exit_code: 0,
                        failure: None,
                    }
                }
                Err(e) => self.fail(TrainingError::Io(e)),
            },
            Err(e) => self.fail(e),
        }
    }

    /// Runs the job and terminates the process with the report's exit code.
    /// Never returns.
    ///
    /// User code may leave threads or children behind that would keep the
    /// process alive, so the exit is forced.
    pub async fn run_and_exit(mut self) {
        let report = self.run().await;
        std::process::exit(report.exit_code)
    }

    async fn execute(&mut self) -> TrainingResult<()> {
        self.transition(TrainingState::FetchingCode);
        self.env.paths().ensure_dirs()?;
        std::fs::create_dir_all(self.env.output_data_dir())?;
        fetch_and_install(
            self.env.user_entry_point(),
            self.env.module_locator(),
            &self.env.code_dir(),
            self.store.as_ref(),
            &self.installer,
            self.install_policy,
        )
        .await?;

        self.transition(TrainingState::Importing);
        let module = self.loader.load(&self.env).await?;
        let capabilities = module.capabilities();

        self.transition(TrainingState::Invoking);
        let descriptor = module.train_parameters();
        let args = Arguments::new(matching_args(&descriptor, &self.env.to_mapping()));
        let names = args.as_mapping().keys().collect::<Vec<_>>();
        tracing::debug!(module = module.name(), args = ?names, "calling train");
        let model = module.train(args).await.map_err(TrainingError::from_user)?;

        self.transition(TrainingState::Saving);
        let model_dir = self.env.model_dir();
        match model.filter(|m| m.is_truthy()) {
            Some(model) if capabilities.save => {
                module.save(&model, &model_dir).await.map_err(TrainingError::from_user)?;
            }
            Some(model) => {
                default_save(&model, &model_dir)?;
            }
            None => tracing::debug!("training returned no model"),
        }
        Ok(())
    }

    fn fail(&mut self, error: TrainingError) -> TrainingReport {
        let failed_in = self.state;
        self.transition(TrainingState::Failed);

        let mut message = format!("Uncaught exception during training: {error}");
        if let Some(details) = error.details() {
            message.push('\n');
            message.push_str(&details);
        }
        tracing::error!(state = %failed_in, "{message}");

        if let Err(e) = write_failure(self.env.paths(), &message) {
            tracing::error!(error = %e, "could not write failure record");
        }

        TrainingReport {
            state: TrainingState::Failed,
            failed_in: Some(failed_in),
            exit_code: error.exit_code(),
            failure: Some(message),
        }
    }

    fn transition(&mut self, next: TrainingState) {
        tracing::debug!(from = %self.state, to = %next, "training state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ParameterDescriptor;
    use crate::module::{FnModule, Model, ModuleRegistry, SAVED_MODEL_FILE};
    use harbor_core::{ContainerPaths, EnvironmentBuilder};
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn environment(temp: &TempDir) -> RuntimeEnvironment {
        let paths = ContainerPaths::new(temp.path());
        std::fs::create_dir_all(paths.input_config_dir()).unwrap();
        let hyperparameters = r#"{"sagemaker_program": "\"train\"", "epochs": "2"}"#;
        std::fs::write(paths.hyperparameters_path(), hyperparameters).unwrap();
        let resources = r#"{"current_host": "algo-1", "hosts": ["algo-1"]}"#;
        std::fs::write(paths.resource_config_path(), resources).unwrap();
        std::fs::write(paths.input_data_config_path(), r#"{"training": {}}"#).unwrap();
        EnvironmentBuilder::new(paths)
            .with_vars(HashMap::<String, String>::new())
            .with_gpu_probe(|| 0)
            .build()
            .unwrap()
    }

    fn engine(temp: &TempDir, module: FnModule) -> TrainingEngine {
        TrainingEngine::new(environment(temp), Arc::new(ModuleRegistry::new().with(module)))
            .with_installer(Installer::default())
            .with_metrics_agent(None)
    }

    #[tokio::test]
    async fn test_saving_module_overrides_default_convention() {
        let temp = TempDir::new().unwrap();
        let module = FnModule::new("train", ParameterDescriptor::new(["hyperparameters"]), |args| {
            let epochs = args.get("hyperparameters")?["epochs"].clone();
            Ok(Some(Model::Json(json!({"epochs": epochs}))))
        })
        .with_save(|model, dir| {
            std::fs::write(dir.join("custom.json"), serde_json::to_vec(model.as_json().unwrap())?)?;
            Ok(())
        });

        let mut engine = engine(&temp, module);
        let report = engine.run().await;

        assert!(report.succeeded());
        assert_eq!(engine.state(), TrainingState::Success);
        let model_dir = engine.environment().model_dir();
        let saved = std::fs::read_to_string(model_dir.join("custom.json")).unwrap();
        assert_eq!(saved, r#"{"epochs":2}"#);
        assert!(!model_dir.join(SAVED_MODEL_FILE).exists());
    }

    #[tokio::test]
    async fn test_falsy_model_is_not_saved() {
        let temp = TempDir::new().unwrap();
        let module = FnModule::new("train", ParameterDescriptor::catch_all(), |_| {
            Ok(Some(Model::Json(json!({}))))
        });

        let mut engine = engine(&temp, module);
        assert!(engine.run().await.succeeded());
        assert!(!engine.environment().model_dir().join(SAVED_MODEL_FILE).exists());
        assert!(engine.environment().paths().success_path().exists());
    }

    #[tokio::test]
    async fn test_missing_argument_fails_at_invocation() {
        let temp = TempDir::new().unwrap();
        let module = FnModule::new("train", ParameterDescriptor::new(["not_provided"]), |args| {
            args.get("not_provided")?;
            Ok(None)
        });

        let mut engine = engine(&temp, module);
        let report = engine.run().await;

        assert_eq!(report.state, TrainingState::Failed);
        assert_eq!(report.failed_in, Some(TrainingState::Invoking));
        let failure = std::fs::read_to_string(engine.environment().paths().failure_path()).unwrap();
        assert!(failure.contains("missing required argument 'not_provided'"));
    }

    #[tokio::test]
    async fn test_unknown_module_fails_in_import() {
        let temp = TempDir::new().unwrap();
        let module =
            FnModule::new("something_else", ParameterDescriptor::catch_all(), |_| Ok(None));

        let mut engine = engine(&temp, module);
        let report = engine.run().await;

        assert_eq!(report.failed_in, Some(TrainingState::Importing));
        assert_eq!(report.exit_code, 1);
        assert!(report.failure.unwrap().contains("no module named 'train'"));
    }
}
