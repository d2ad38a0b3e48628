//! `harbor train`

use super::{container_paths, init_logging};
use harbor_core::sentinel::write_failure;
use harbor_core::{EnvironmentBuilder, LogLevel, ProcessEnv};
use harbor_training::{InstallPolicy, Installer, ScriptLoader, TrainingEngine};
use std::path::PathBuf;
use std::sync::Arc;

/// Runs the training job and exits the process with its exit code.
pub async fn execute(
    base_path: Option<PathBuf>,
    log_level: Option<LogLevel>,
    install_as_package: bool,
    no_metrics: bool,
) {
    let paths = container_paths(base_path);
    let env = match EnvironmentBuilder::new(paths.clone()).build() {
        Ok(env) => env,
        Err(e) => {
            init_logging(log_level.unwrap_or_default());
            let message = format!("Invalid training configuration: {e}");
            tracing::error!("{message}");
            if let Err(write_err) = write_failure(&paths, &message) {
                tracing::error!("Cannot write failure record: {write_err}");
            }
            std::process::exit(1);
        }
    };
    init_logging(log_level.unwrap_or_else(|| env.log_level()));

    let installer = Installer::from_vars(&ProcessEnv);
    let policy = if install_as_package { InstallPolicy::Package } else { InstallPolicy::Auto };
    let mut engine = TrainingEngine::new(env, Arc::new(ScriptLoader::new(installer.clone())))
        .with_installer(installer)
        .with_install_policy(policy);
    if no_metrics {
        engine = engine.with_metrics_agent(None);
    }

    engine.run_and_exit().await;
}
