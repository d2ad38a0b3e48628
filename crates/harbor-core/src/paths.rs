use crate::params::BASE_PATH_ENV;
use crate::vars::VarSource;
use std::path::{Path, PathBuf};

/// Default container root used by the managed service.
pub const DEFAULT_BASE_PATH: &str = "/opt/ml";

pub const HYPERPARAMETERS_FILE: &str = "hyperparameters.json";
pub const RESOURCE_CONFIG_FILE: &str = "resourceconfig.json";
pub const INPUT_DATA_CONFIG_FILE: &str = "inputdataconfig.json";
pub const SUCCESS_FILE: &str = "success";
pub const FAILURE_FILE: &str = "failure";

/// Filesystem layout of the container contract.
///
/// Every path is derived from one root:
///
/// ```text
/// <root>/input/config/{hyperparameters,resourceconfig,inputdataconfig}.json
/// <root>/input/data/<channel>/...
/// <root>/model/...
/// <root>/output/{success,failure}
/// <root>/output/data/<current_host>/...
/// <root>/code/...
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPaths {
    root: PathBuf,
}

impl ContainerPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `BASE_PATH`, falling back to `/opt/ml`.
    #[must_use]
    pub fn from_vars(vars: &dyn VarSource) -> Self {
        Self::new(vars.var(BASE_PATH_ENV).unwrap_or_else(|| DEFAULT_BASE_PATH.to_string()))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input")
    }

    #[must_use]
    pub fn input_config_dir(&self) -> PathBuf {
        self.input_dir().join("config")
    }

    #[must_use]
    pub fn input_data_dir(&self) -> PathBuf {
        self.input_dir().join("data")
    }

    #[must_use]
    pub fn hyperparameters_path(&self) -> PathBuf {
        self.input_config_dir().join(HYPERPARAMETERS_FILE)
    }

    #[must_use]
    pub fn resource_config_path(&self) -> PathBuf {
        self.input_config_dir().join(RESOURCE_CONFIG_FILE)
    }

    #[must_use]
    pub fn input_data_config_path(&self) -> PathBuf {
        self.input_config_dir().join(INPUT_DATA_CONFIG_FILE)
    }

    /// Directory for one input channel, without any suffix override.
    #[must_use]
    pub fn channel_dir(&self, channel: &str) -> PathBuf {
        self.input_data_dir().join(channel)
    }

    #[must_use]
    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Non-model artifacts retained by the service, one directory per host.
    #[must_use]
    pub fn output_data_dir(&self, current_host: &str) -> PathBuf {
        self.output_dir().join("data").join(current_host)
    }

    #[must_use]
    pub fn code_dir(&self) -> PathBuf {
        self.root.join("code")
    }

    #[must_use]
    pub fn success_path(&self) -> PathBuf {
        self.output_dir().join(SUCCESS_FILE)
    }

    #[must_use]
    pub fn failure_path(&self) -> PathBuf {
        self.output_dir().join(FAILURE_FILE)
    }

    /// Creates the writable directories (model, output, code).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.model_dir())?;
        std::fs::create_dir_all(self.output_dir())?;
        std::fs::create_dir_all(self.code_dir())?;
        Ok(())
    }
}

impl Default for ContainerPaths {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}
