use crate::matcher::ArgumentError;
use harbor_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The package or requirements install exited non-zero.
    #[error("InstallModuleError: `{cmd}` exited with code {code}")]
    InstallModule { cmd: String, code: i32 },

    /// The user entry point exited non-zero.
    #[error("ExecuteUserScriptError: `{cmd}` exited with code {code}")]
    ExecuteUserScript {
        cmd: String,
        code: i32,
        /// Last lines the process wrote to stderr.
        stderr_tail: String,
    },

    /// A child process could not be started at all.
    #[error("failed to start `{cmd}`: {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ImportModuleError: {0}")]
    ImportModule(String),

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("failed to extract {}: {source}", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid code locator: {0}")]
    InvalidLocator(String),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    /// An error returned by user code.
    #[error("{0:#}")]
    UserCode(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    /// Wraps an error coming back through the user-code seam, keeping typed
    /// harness errors (a failed script, a missing argument) intact.
    pub fn from_user(err: anyhow::Error) -> Self {
        match err.downcast::<Self>() {
            Ok(typed) => typed,
            Err(err) => match err.downcast::<ArgumentError>() {
                Ok(arg) => Self::Argument(arg),
                Err(err) => Self::UserCode(err),
            },
        }
    }

    /// Process exit status for this failure.
    ///
    /// A failed child propagates its own non-zero code; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ExecuteUserScript { code, .. } | Self::InstallModule { code, .. }
                if *code != 0 =>
            {
                *code
            }
            _ => 1,
        }
    }

    /// Extra diagnostic text for the failure record.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::ExecuteUserScript { stderr_tail, .. } if !stderr_tail.is_empty() => {
                Some(stderr_tail.clone())
            }
            Self::UserCode(err) => Some(format!("{err:?}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_follows_child() {
        let err = TrainingError::ExecuteUserScript {
            cmd: "./train".into(),
            code: 42,
            stderr_tail: String::new(),
        };
        assert_eq!(err.exit_code(), 42);

        let err = TrainingError::InstallModule { cmd: "pip".into(), code: 2 };
        assert_eq!(err.exit_code(), 2);

        assert_eq!(TrainingError::ImportModule("x".into()).exit_code(), 1);
        assert_eq!(TrainingError::UserCode(anyhow::anyhow!("boom")).exit_code(), 1);
    }

    #[test]
    fn test_from_user_recovers_typed_errors() {
        let typed = anyhow::Error::new(TrainingError::InstallModule { cmd: "pip".into(), code: 3 });
        let recovered = TrainingError::from_user(typed);
        assert!(matches!(recovered, TrainingError::InstallModule { code: 3, .. }));

        let missing = anyhow::Error::new(ArgumentError::Missing("x".into()));
        assert!(matches!(TrainingError::from_user(missing), TrainingError::Argument(_)));

        let plain = anyhow::anyhow!("division by zero");
        let err = TrainingError::from_user(plain);
        assert_eq!(err.to_string(), "division by zero");
        assert!(err.details().is_some());
    }
}
