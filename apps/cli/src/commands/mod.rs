//! CLI command implementations.

pub mod env;
pub mod serve;
pub mod train;

use harbor_core::{ContainerPaths, LogLevel, ProcessEnv};
use std::path::PathBuf;

/// Container root from the flag, else from `BASE_PATH`.
pub fn container_paths(base_path: Option<PathBuf>) -> ContainerPaths {
    base_path.map_or_else(|| ContainerPaths::from_vars(&ProcessEnv), ContainerPaths::new)
}

/// Installs the global subscriber. A second call keeps the first subscriber.
pub fn init_logging(level: LogLevel) {
    if let Err(e) = harbor_core::logging::init(level) {
        eprintln!("logging disabled: {e}");
    }
}
