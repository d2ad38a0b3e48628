//! Names of reserved hyperparameters and environment variables.
//!
//! These strings are the wire contract with the managed training service and
//! must not change.

/// Name of the user program (script, package module or command).
pub const USER_PROGRAM_PARAM: &str = "sagemaker_program";
/// Locator of the user code archive or directory.
pub const SUBMIT_DIR_PARAM: &str = "sagemaker_submit_directory";
/// Whether the metrics agent should run.
pub const ENABLE_METRICS_PARAM: &str = "sagemaker_enable_cloudwatch_metrics";
/// Container log level.
pub const LOG_LEVEL_PARAM: &str = "sagemaker_container_log_level";
/// Training job name.
pub const JOB_NAME_PARAM: &str = "sagemaker_job_name";
/// Fallback user module name.
pub const DEFAULT_MODULE_NAME_PARAM: &str = "default_user_module_name";
/// Region override.
pub const REGION_NAME_PARAM: &str = "sagemaker_region";

/// The fixed set of framework-recognized hyperparameter keys.
pub const RESERVED_HYPERPARAMETERS: [&str; 7] = [
    USER_PROGRAM_PARAM,
    SUBMIT_DIR_PARAM,
    ENABLE_METRICS_PARAM,
    LOG_LEVEL_PARAM,
    JOB_NAME_PARAM,
    DEFAULT_MODULE_NAME_PARAM,
    REGION_NAME_PARAM,
];

/// Module name used when neither the program nor the default-module parameter is set.
pub const DEFAULT_MODULE_NAME: &str = "default_user_module_name";

/// Suffix of the per-channel hyperparameter selecting a sub-directory of the channel.
///
/// `training_channel_suffix = "shard-0"` resolves the `training` channel to
/// `input/data/training/shard-0` when that directory exists.
pub const CHANNEL_SUFFIX_PARAM_SUFFIX: &str = "_channel_suffix";

pub const BASE_PATH_ENV: &str = "BASE_PATH";
pub const CURRENT_HOST_ENV: &str = "CURRENT_HOST";
pub const JOB_NAME_ENV: &str = "JOB_NAME";
pub const REGION_NAME_ENV: &str = "SAGEMAKER_REGION";
pub const USER_PROGRAM_ENV: &str = "SAGEMAKER_PROGRAM";
pub const SUBMIT_DIR_ENV: &str = "SAGEMAKER_SUBMIT_DIRECTORY";
pub const ENABLE_METRICS_ENV: &str = "SAGEMAKER_ENABLE_CLOUDWATCH_METRICS";
pub const LOG_LEVEL_ENV: &str = "SAGEMAKER_CONTAINER_LOG_LEVEL";
pub const USE_NGINX_ENV: &str = "SAGEMAKER_USE_NGINX";
pub const MODEL_SERVER_TIMEOUT_ENV: &str = "SAGEMAKER_MODEL_SERVER_TIMEOUT";
pub const MODEL_SERVER_WORKERS_ENV: &str = "SAGEMAKER_MODEL_SERVER_WORKERS";
pub const BIND_ENV: &str = "SAGEMAKER_BIND";
pub const TRAINING_MODULE_ENV: &str = "SAGEMAKER_TRAINING_MODULE";
pub const SERVING_MODULE_ENV: &str = "SAGEMAKER_SERVING_MODULE";
pub const AWS_REGION_ENV: &str = "AWS_REGION";
pub const AWS_DEFAULT_REGION_ENV: &str = "AWS_DEFAULT_REGION";
pub const PYTHON_ENV: &str = "HARBOR_PYTHON";

/// Default network interface name used for distributed training.
pub const DEFAULT_NETWORK_INTERFACE: &str = "ethwe";
