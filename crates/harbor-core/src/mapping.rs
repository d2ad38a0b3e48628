//! Conversions from the environment and hyperparameters into the shapes a
//! child process consumes: command-line arguments and environment variables.

use crate::config::Mapping;
use crate::environment::{RuntimeEnvironment, value_as_string};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix of every variable produced by [`to_env_vars`].
pub const ENV_PREFIX: &str = "SAGEMAKER_";

/// Renders a mapping as command-line arguments.
///
/// Keys are sorted. Single-character keys become `-k`, longer keys `--key`.
/// Object values render as `k1=v1,k2=v2` with sorted keys; strings are passed
/// unquoted; everything else as its JSON text.
///
/// ```
/// use harbor_core::mapping::to_cmd_args;
/// use serde_json::json;
///
/// let hps = json!({"epochs": 10, "n": "x"}).as_object().cloned().unwrap();
/// assert_eq!(to_cmd_args(&hps), ["--epochs", "10", "-n", "x"]);
/// ```
pub fn to_cmd_args(mapping: &Mapping) -> Vec<String> {
    let sorted: BTreeMap<&String, &Value> = mapping.iter().collect();
    let mut args = Vec::with_capacity(sorted.len() * 2);
    for (key, value) in sorted {
        if key.is_empty() {
            continue;
        }
        args.push(arg_name(key));
        args.push(arg_value(value));
    }
    args
}

fn arg_name(key: &str) -> String {
    if key.chars().count() > 1 { format!("--{key}") } else { format!("-{key}") }
}

fn arg_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            sorted
                .into_iter()
                .map(|(k, v)| format!("{k}={}", value_as_string(v)))
                .collect::<Vec<_>>()
                .join(",")
        }
        other => value_as_string(other),
    }
}

/// Environment variables describing `env` to user code.
///
/// Includes the variables from [`RuntimeEnvironment::exported_vars`].
pub fn to_env_vars(env: &RuntimeEnvironment) -> BTreeMap<String, String> {
    let mut vars = env.exported_vars();
    let mut put = |name: &str, value: String| {
        vars.insert(format!("{ENV_PREFIX}{name}"), value);
    };

    let channels: Vec<&str> = env.channel_input_dirs().keys().map(String::as_str).collect();
    put("CHANNELS", Value::from(channels).to_string());
    for (channel, dir) in env.channel_input_dirs() {
        put(&format!("CHANNEL_{}", channel.to_ascii_uppercase()), dir.display().to_string());
    }

    put("MODEL_DIR", env.model_dir().display().to_string());
    put("OUTPUT_DIR", env.output_dir().display().to_string());
    put("OUTPUT_DATA_DIR", env.output_data_dir().display().to_string());
    put("HOSTS", Value::from(env.hosts().to_vec()).to_string());
    put("CURRENT_HOST", env.current_host().to_string());
    put("HPS", Value::Object(env.hyperparameters().clone()).to_string());
    put("NUM_CPUS", env.num_cpus().to_string());
    put("NUM_GPUS", env.num_gpus().to_string());
    put("NETWORK_INTERFACE_NAME", env.network_interface_name().to_string());
    put("MODULE_NAME", env.module_name().to_string());
    vars
}
