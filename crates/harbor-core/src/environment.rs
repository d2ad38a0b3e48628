//! The runtime environment snapshot.
//!
//! [`RuntimeEnvironment`] aggregates the configuration files, host topology,
//! channel directories, hardware counts and user-module identity into one
//! read-only value built once per process and passed to everything downstream.

use crate::config::{
    InputDataConfig, Mapping, ResourceConfig, read_hyperparameters, read_input_data_config,
    split_hyperparameters,
};
use crate::error::ConfigError;
use crate::hardware;
use crate::logging::LogLevel;
use crate::params::{
    AWS_DEFAULT_REGION_ENV, AWS_REGION_ENV, CHANNEL_SUFFIX_PARAM_SUFFIX, CURRENT_HOST_ENV,
    DEFAULT_MODULE_NAME, DEFAULT_MODULE_NAME_PARAM, DEFAULT_NETWORK_INTERFACE, ENABLE_METRICS_ENV,
    ENABLE_METRICS_PARAM, JOB_NAME_ENV, JOB_NAME_PARAM, LOG_LEVEL_ENV, LOG_LEVEL_PARAM,
    REGION_NAME_ENV, REGION_NAME_PARAM, SUBMIT_DIR_ENV, SUBMIT_DIR_PARAM, TRAINING_MODULE_ENV,
    USER_PROGRAM_ENV, USER_PROGRAM_PARAM,
};
use crate::paths::ContainerPaths;
use crate::vars::{ProcessEnv, VarSource, parse_flag};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read-only snapshot of the training container environment.
#[derive(Debug, Clone)]
pub struct RuntimeEnvironment {
    paths: ContainerPaths,
    hyperparameters: Mapping,
    reserved_parameters: Mapping,
    resource_config: ResourceConfig,
    input_data_config: InputDataConfig,
    channel_input_dirs: BTreeMap<String, PathBuf>,
    num_cpus: usize,
    num_gpus: usize,
    user_entry_point: String,
    module_name: String,
    module_locator: String,
    job_name: Option<String>,
    region: Option<String>,
    enable_metrics: bool,
    log_level: LogLevel,
    framework_module: Option<String>,
}

impl RuntimeEnvironment {
    /// Builds the environment from the real process: `BASE_PATH` (or `/opt/ml`),
    /// the process environment and the `nvidia-smi` probe.
    pub fn create() -> Result<Self, ConfigError> {
        EnvironmentBuilder::new(ContainerPaths::from_vars(&ProcessEnv)).build()
    }

    pub fn paths(&self) -> &ContainerPaths {
        &self.paths
    }

    /// User hyperparameters (reserved keys removed), values JSON-decoded.
    pub fn hyperparameters(&self) -> &Mapping {
        &self.hyperparameters
    }

    /// Framework-recognized hyperparameters.
    pub fn reserved_parameters(&self) -> &Mapping {
        &self.reserved_parameters
    }

    pub fn resource_config(&self) -> &ResourceConfig {
        &self.resource_config
    }

    pub fn current_host(&self) -> &str {
        &self.resource_config.current_host
    }

    /// All hosts, lexicographically ordered.
    pub fn hosts(&self) -> &[String] {
        &self.resource_config.hosts
    }

    pub fn network_interface_name(&self) -> &str {
        self.resource_config.network_interface_name.as_deref().unwrap_or(DEFAULT_NETWORK_INTERFACE)
    }

    pub fn input_data_config(&self) -> &InputDataConfig {
        &self.input_data_config
    }

    /// Channel name to data directory. Same key set as [`Self::input_data_config`].
    pub fn channel_input_dirs(&self) -> &BTreeMap<String, PathBuf> {
        &self.channel_input_dirs
    }

    pub fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    pub fn num_gpus(&self) -> usize {
        self.num_gpus
    }

    /// The program name as submitted, e.g. `train.py`.
    pub fn user_entry_point(&self) -> &str {
        &self.user_entry_point
    }

    /// The program name without a `.py` extension, e.g. `train`.
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Where the user code is fetched from (object storage URL or local path).
    pub fn module_locator(&self) -> &str {
        &self.module_locator
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn enable_metrics(&self) -> bool {
        self.enable_metrics
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn framework_module(&self) -> Option<&str> {
        self.framework_module.as_deref()
    }

    pub fn model_dir(&self) -> PathBuf {
        self.paths.model_dir()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.paths.output_dir()
    }

    pub fn output_data_dir(&self) -> PathBuf {
        self.paths.output_data_dir(self.current_host())
    }

    pub fn code_dir(&self) -> PathBuf {
        self.paths.code_dir()
    }

    /// Variables exported to every child process so user code sees the
    /// resolved job name, host and region.
    pub fn exported_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(CURRENT_HOST_ENV.to_string(), self.current_host().to_string());
        if let Some(job_name) = &self.job_name {
            vars.insert(JOB_NAME_ENV.to_string(), job_name.clone());
        }
        if let Some(region) = &self.region {
            vars.insert(REGION_NAME_ENV.to_string(), region.clone());
        }
        vars
    }

    /// The environment as a JSON mapping.
    ///
    /// This is the candidate mapping user entry functions pick their arguments
    /// from, and what `harbor env` prints.
    pub fn to_mapping(&self) -> Mapping {
        let value = json!({
            "hyperparameters": self.hyperparameters,
            "reserved_parameters": self.reserved_parameters,
            "resource_config": self.resource_config,
            "input_data_config": self.input_data_config,
            "channel_input_dirs": self.channel_input_dirs,
            "current_host": self.current_host(),
            "hosts": self.hosts(),
            "network_interface_name": self.network_interface_name(),
            "num_cpus": self.num_cpus,
            "num_gpus": self.num_gpus,
            "user_entry_point": self.user_entry_point,
            "module_name": self.module_name,
            "module_dir": self.module_locator,
            "job_name": self.job_name,
            "region": self.region,
            "enable_metrics": self.enable_metrics,
            "log_level": self.log_level.as_str(),
            "framework_module": self.framework_module,
            "input_dir": self.paths.input_dir(),
            "input_config_dir": self.paths.input_config_dir(),
            "model_dir": self.model_dir(),
            "output_dir": self.output_dir(),
            "output_data_dir": self.output_data_dir(),
            "code_dir": self.code_dir(),
        });
        match value {
            Value::Object(map) => map,
            _ => Mapping::new(),
        }
    }
}

/// Step-by-step construction of a [`RuntimeEnvironment`].
pub struct EnvironmentBuilder {
    paths: ContainerPaths,
    vars: Box<dyn VarSource>,
    gpu_probe: Box<dyn Fn() -> usize>,
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn new(paths: ContainerPaths) -> Self {
        Self { paths, vars: Box::new(ProcessEnv), gpu_probe: Box::new(hardware::gpu_count) }
    }

    /// Reads environment variables from `vars` instead of the process.
    #[must_use]
    pub fn with_vars(mut self, vars: impl VarSource + 'static) -> Self {
        self.vars = Box::new(vars);
        self
    }

    /// Replaces the GPU inventory probe.
    #[must_use]
    pub fn with_gpu_probe(mut self, probe: impl Fn() -> usize + 'static) -> Self {
        self.gpu_probe = Box::new(probe);
        self
    }

    /// Reads every configuration file and resolves the environment.
    ///
    /// # Errors
    ///
    /// Fails if any of the three configuration files is missing or malformed,
    /// or if `current_host` is not one of `hosts`. The GPU probe never fails.
    pub fn build(self) -> Result<RuntimeEnvironment, ConfigError> {
        let resource_config = ResourceConfig::read(&self.paths.resource_config_path())?;
        let input_data_config = read_input_data_config(&self.paths.input_data_config_path())?;

        let all_hyperparameters = read_hyperparameters(&self.paths.hyperparameters_path())?;
        let (reserved, hyperparameters) = split_hyperparameters(&all_hyperparameters);

        let channel_input_dirs = input_data_config
            .keys()
            .map(|channel| {
                (channel.clone(), resolve_channel_dir(&self.paths, channel, &hyperparameters))
            })
            .collect();

        let num_cpus = hardware::cpu_count();
        let num_gpus = (self.gpu_probe)();

        let vars = self.vars.as_ref();
        let region = reserved_string(&reserved, REGION_NAME_PARAM)
            .or_else(|| vars.var(AWS_REGION_ENV))
            .or_else(|| vars.var(AWS_DEFAULT_REGION_ENV));
        let job_name =
            reserved_string(&reserved, JOB_NAME_PARAM).or_else(|| vars.var(JOB_NAME_ENV));

        let user_entry_point = reserved_string(&reserved, USER_PROGRAM_PARAM)
            .or_else(|| vars.var(USER_PROGRAM_ENV))
            .or_else(|| reserved_string(&reserved, DEFAULT_MODULE_NAME_PARAM))
            .unwrap_or_else(|| DEFAULT_MODULE_NAME.to_string());
        let module_name = parse_module_name(&user_entry_point);
        let module_locator = reserved_string(&reserved, SUBMIT_DIR_PARAM)
            .or_else(|| vars.var(SUBMIT_DIR_ENV))
            .unwrap_or_default();

        let enable_metrics = reserved
            .get(ENABLE_METRICS_PARAM)
            .and_then(value_as_flag)
            .or_else(|| vars.flag(ENABLE_METRICS_ENV))
            .unwrap_or(false);
        let log_level = reserved
            .get(LOG_LEVEL_PARAM)
            .and_then(LogLevel::from_value)
            .or_else(|| vars.var(LOG_LEVEL_ENV).and_then(|v| LogLevel::parse(&v)))
            .unwrap_or_default();

        Ok(RuntimeEnvironment {
            framework_module: vars.var(TRAINING_MODULE_ENV),
            paths: self.paths,
            hyperparameters,
            reserved_parameters: reserved,
            resource_config,
            input_data_config,
            channel_input_dirs,
            num_cpus,
            num_gpus,
            user_entry_point,
            module_name,
            module_locator,
            job_name,
            region,
            enable_metrics,
            log_level,
        })
    }
}

/// Resolves the data directory of `channel`.
///
/// The default is `input/data/<channel>`. When the user hyperparameters carry
/// `<channel>_channel_suffix`, `input/data/<channel>/<suffix>` is used instead,
/// but only if that directory exists on disk.
pub fn resolve_channel_dir(
    paths: &ContainerPaths,
    channel: &str,
    hyperparameters: &Mapping,
) -> PathBuf {
    let base = paths.channel_dir(channel);
    let key = format!("{channel}{CHANNEL_SUFFIX_PARAM_SUFFIX}");
    let Some(suffix) = hyperparameters.get(&key).map(value_as_string) else {
        return base;
    };

    let candidate = base.join(&suffix);
    if candidate.exists() {
        candidate
    } else {
        tracing::debug!(
            channel,
            candidate = %candidate.display(),
            "channel suffix directory does not exist, using channel root"
        );
        base
    }
}

/// Strips a `.py` extension from a program name.
pub fn parse_module_name(program: &str) -> String {
    program.strip_suffix(".py").unwrap_or(program).to_string()
}

fn reserved_string(reserved: &Mapping, key: &str) -> Option<String> {
    reserved.get(key).filter(|v| !v.is_null()).map(value_as_string)
}

/// Renders a decoded hyperparameter as a plain string (strings unquoted).
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => parse_flag(s),
        _ => None,
    }
}

/// Returns true if `path` exists and contains at least one entry.
pub fn dir_has_entries(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut entries| entries.next().is_some()).unwrap_or(false)
}
