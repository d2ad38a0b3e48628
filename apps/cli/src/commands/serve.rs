//! `harbor serve`

use super::{container_paths, init_logging};
use harbor_core::{LogLevel, ProcessEnv, ServingEnvironment};
use harbor_serving::{ProcessServingModule, Worker};
use harbor_training::Installer;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn execute(
    base_path: Option<PathBuf>,
    log_level: Option<LogLevel>,
) -> anyhow::Result<()> {
    let env = ServingEnvironment::from_vars(container_paths(base_path), &ProcessEnv)?;
    init_logging(log_level.unwrap_or_else(|| env.log_level()));

    tracing::info!(
        bind = %env.bind(),
        workers = env.model_server_workers(),
        timeout_secs = env.model_server_timeout().as_secs(),
        entry_point = env.user_entry_point(),
        "starting inference worker"
    );

    let module = ProcessServingModule::load(&env, &Installer::from_vars(&ProcessEnv)).await?;
    Worker::new(env, Arc::new(module)).run().await
}
