//! Success and failure records read by the orchestrator.

use crate::paths::ContainerPaths;
use std::path::PathBuf;

/// Number of leading characters of the failure record the service surfaces.
pub const FAILURE_REASON_LIMIT: usize = 1024;

/// Writes `output/success`, with an optional message.
pub fn write_success(paths: &ContainerPaths, message: Option<&str>) -> std::io::Result<PathBuf> {
    write_record(paths.success_path(), message.unwrap_or_default())
}

/// Writes `output/failure` with the full failure description.
///
/// Only the first [`FAILURE_REASON_LIMIT`] characters reach the job status, so
/// the message should lead with the error itself.
pub fn write_failure(paths: &ContainerPaths, message: &str) -> std::io::Result<PathBuf> {
    write_record(paths.failure_path(), message)
}

fn write_record(path: PathBuf, contents: &str) -> std::io::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, contents)?;
    tracing::debug!(path = %path.display(), "wrote job record");
    Ok(path)
}
