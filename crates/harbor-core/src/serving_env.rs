//! Settings of the inference container.

use crate::environment::parse_module_name;
use crate::error::ConfigError;
use crate::hardware;
use crate::logging::LogLevel;
use crate::params::{
    AWS_DEFAULT_REGION_ENV, AWS_REGION_ENV, BIND_ENV, DEFAULT_MODULE_NAME, LOG_LEVEL_ENV,
    MODEL_SERVER_TIMEOUT_ENV, MODEL_SERVER_WORKERS_ENV, REGION_NAME_ENV, SERVING_MODULE_ENV,
    SUBMIT_DIR_ENV, USE_NGINX_ENV, USER_PROGRAM_ENV,
};
use crate::paths::ContainerPaths;
use crate::vars::{ProcessEnv, VarSource};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_MODEL_SERVER_TIMEOUT_SECS: u64 = 60;

/// Read-only settings for a serving worker, all taken from environment variables.
#[derive(Debug, Clone)]
pub struct ServingEnvironment {
    paths: ContainerPaths,
    use_nginx: bool,
    model_server_timeout: Duration,
    model_server_workers: usize,
    bind: SocketAddr,
    framework_module: Option<String>,
    user_entry_point: String,
    module_name: String,
    module_locator: String,
    region: Option<String>,
    log_level: LogLevel,
}

impl ServingEnvironment {
    pub fn create() -> Result<Self, ConfigError> {
        Self::from_vars(ContainerPaths::from_vars(&ProcessEnv), &ProcessEnv)
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` when a numeric variable or the bind address does
    /// not parse.
    pub fn from_vars(paths: ContainerPaths, vars: &dyn VarSource) -> Result<Self, ConfigError> {
        let model_server_timeout = match vars.var(MODEL_SERVER_TIMEOUT_ENV) {
            Some(v) => Duration::from_secs(parse_number(MODEL_SERVER_TIMEOUT_ENV, &v)?),
            None => Duration::from_secs(DEFAULT_MODEL_SERVER_TIMEOUT_SECS),
        };
        let model_server_workers = match vars.var(MODEL_SERVER_WORKERS_ENV) {
            Some(v) => usize::try_from(parse_number(MODEL_SERVER_WORKERS_ENV, &v)?)
                .map_err(|_| {
                    ConfigError::Invalid(format!("{MODEL_SERVER_WORKERS_ENV} is out of range"))
                })?
                .max(1),
            None => hardware::cpu_count(),
        };
        let bind_value = vars.var(BIND_ENV).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_value.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Invalid(format!("{BIND_ENV}='{bind_value}' is not a socket address: {e}"))
        })?;

        let user_entry_point =
            vars.var(USER_PROGRAM_ENV).unwrap_or_else(|| DEFAULT_MODULE_NAME.to_string());

        Ok(Self {
            paths,
            use_nginx: vars.flag(USE_NGINX_ENV).unwrap_or(true),
            model_server_timeout,
            model_server_workers,
            bind,
            framework_module: vars.var(SERVING_MODULE_ENV),
            module_name: parse_module_name(&user_entry_point),
            user_entry_point,
            module_locator: vars.var(SUBMIT_DIR_ENV).unwrap_or_default(),
            region: vars
                .var(REGION_NAME_ENV)
                .or_else(|| vars.var(AWS_REGION_ENV))
                .or_else(|| vars.var(AWS_DEFAULT_REGION_ENV)),
            log_level: vars
                .var(LOG_LEVEL_ENV)
                .and_then(|v| LogLevel::parse(&v))
                .unwrap_or_default(),
        })
    }

    pub fn paths(&self) -> &ContainerPaths {
        &self.paths
    }

    pub fn model_dir(&self) -> PathBuf {
        self.paths.model_dir()
    }

    pub fn code_dir(&self) -> PathBuf {
        self.paths.code_dir()
    }

    pub fn use_nginx(&self) -> bool {
        self.use_nginx
    }

    pub fn model_server_timeout(&self) -> Duration {
        self.model_server_timeout
    }

    /// Maximum in-flight requests for this worker.
    pub fn model_server_workers(&self) -> usize {
        self.model_server_workers
    }

    pub fn bind(&self) -> SocketAddr {
        self.bind
    }

    pub fn framework_module(&self) -> Option<&str> {
        self.framework_module.as_deref()
    }

    pub fn user_entry_point(&self) -> &str {
        &self.user_entry_point
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn module_locator(&self) -> &str {
        &self.module_locator
    }

    /// Region for object storage locators: `SAGEMAKER_REGION`, then
    /// `AWS_REGION`, then `AWS_DEFAULT_REGION`.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e| {
        ConfigError::Invalid(format!("{name}='{value}' is not a non-negative integer: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn no_vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults() {
        let env = ServingEnvironment::from_vars(ContainerPaths::default(), &no_vars()).unwrap();
        assert!(env.use_nginx());
        assert_eq!(env.model_server_timeout(), Duration::from_secs(60));
        assert_eq!(env.model_server_workers(), hardware::cpu_count());
        assert_eq!(env.bind().to_string(), "0.0.0.0:8080");
        assert_eq!(env.module_name(), DEFAULT_MODULE_NAME);
        assert_eq!(env.log_level(), LogLevel::Info);
    }

    #[test]
    fn test_overrides() {
        let vars = vars(&[
            (USE_NGINX_ENV, "false"),
            (MODEL_SERVER_TIMEOUT_ENV, "120"),
            (MODEL_SERVER_WORKERS_ENV, "4"),
            (BIND_ENV, "127.0.0.1:9000"),
            (USER_PROGRAM_ENV, "inference.py"),
            (SERVING_MODULE_ENV, "harbor_serving.default"),
            (LOG_LEVEL_ENV, "10"),
        ]);
        let env = ServingEnvironment::from_vars(ContainerPaths::new("/tmp/ml"), &vars).unwrap();
        assert!(!env.use_nginx());
        assert_eq!(env.model_server_timeout(), Duration::from_secs(120));
        assert_eq!(env.model_server_workers(), 4);
        assert_eq!(env.bind().port(), 9000);
        assert_eq!(env.module_name(), "inference");
        assert_eq!(env.framework_module(), Some("harbor_serving.default"));
        assert_eq!(env.log_level(), LogLevel::Debug);
        assert_eq!(env.model_dir(), PathBuf::from("/tmp/ml/model"));
    }

    #[test]
    fn test_region_resolution_order() {
        let paths = ContainerPaths::default();
        let env = ServingEnvironment::from_vars(paths.clone(), &no_vars()).unwrap();
        assert_eq!(env.region(), None);

        let fallback = vars(&[(AWS_DEFAULT_REGION_ENV, "us-west-2")]);
        let env = ServingEnvironment::from_vars(paths.clone(), &fallback).unwrap();
        assert_eq!(env.region(), Some("us-west-2"));

        let both = vars(&[(AWS_DEFAULT_REGION_ENV, "us-west-2"), (AWS_REGION_ENV, "eu-west-1")]);
        let env = ServingEnvironment::from_vars(paths.clone(), &both).unwrap();
        assert_eq!(env.region(), Some("eu-west-1"));

        let all = vars(&[(AWS_REGION_ENV, "eu-west-1"), (REGION_NAME_ENV, "ap-south-1")]);
        let env = ServingEnvironment::from_vars(paths, &all).unwrap();
        assert_eq!(env.region(), Some("ap-south-1"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let vars = vars(&[(MODEL_SERVER_TIMEOUT_ENV, "soon")]);
        let err = ServingEnvironment::from_vars(ContainerPaths::default(), &vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
