//! Error types for Harbor Core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading the container configuration contract.
///
/// All of these are fatal: they mean the container was not launched with the
/// files and variables the managed service is expected to provide.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration file is missing.
    #[error("configuration file not found: {}", path.display())]
    NotFound {
        /// The path that was expected to exist.
        path: PathBuf,
    },

    /// A configuration file exists but is not valid JSON of the expected shape.
    #[error("malformed configuration file {}: {source}", path.display())]
    Malformed {
        /// The offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration parsed but violates the contract.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// I/O error while reading a configuration file.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Core error type for Harbor operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Logging could not be initialised
    #[error("logging error: {0}")]
    Logging(String),
}

/// Result type alias for Harbor Core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
