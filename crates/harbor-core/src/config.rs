//! Configuration reader for the JSON files under `input/config`.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// A flat JSON object.
pub type Mapping = Map<String, Value>;

/// Reads and parses a JSON file.
///
/// # Errors
///
/// `ConfigError::NotFound` if the path does not exist, `ConfigError::Malformed`
/// if it does not parse into `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound { path: path.to_path_buf() });
        }
        Err(e) => return Err(ConfigError::Io { path: path.to_path_buf(), source: e }),
    };
    serde_json::from_slice(&bytes)
        .map_err(|source| ConfigError::Malformed { path: path.to_path_buf(), source })
}

/// Reads `hyperparameters.json` and decodes every value.
///
/// See [`decode_hyperparameters`].
pub fn read_hyperparameters(path: &Path) -> Result<Mapping, ConfigError> {
    let raw: Mapping = read_json(path)?;
    Ok(decode_hyperparameters(raw))
}

/// Decodes JSON-encoded string values, leaving everything else untouched.
///
/// The service writes every value as a JSON-encoded string (`{"epochs": "10"}`),
/// local tooling often writes raw JSON (`{"epochs": 10}`). Both decode to the
/// same mapping. A string that is not valid JSON is kept verbatim.
pub fn decode_hyperparameters(raw: Mapping) -> Mapping {
    raw.into_iter().map(|(key, value)| (key, decode_value(value))).collect()
}

fn decode_value(value: Value) -> Value {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(decoded) => decoded,
            Err(_) => {
                tracing::trace!(
                    value = %s,
                    "hyperparameter is not JSON-encoded, keeping raw string"
                );
                Value::String(s)
            }
        },
        other => other,
    }
}

/// The result of partitioning a mapping by a key set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    /// Entries whose key is in the criteria.
    pub included: Mapping,
    /// Every other entry.
    pub excluded: Mapping,
}

/// Partitions `mapping` into entries whose key is in `keys` and the rest.
///
/// The partition is total and disjoint: every key lands in exactly one side.
pub fn split_by_criteria<'a>(mapping: &Mapping, keys: impl IntoIterator<Item = &'a str>) -> Split {
    let keys: HashSet<&str> = keys.into_iter().collect();
    let mut split = Split::default();
    for (key, value) in mapping {
        if keys.contains(key.as_str()) {
            split.included.insert(key.clone(), value.clone());
        } else {
            split.excluded.insert(key.clone(), value.clone());
        }
    }
    split
}

/// Splits hyperparameters into `(reserved, user)` using the recognized key set.
pub fn split_hyperparameters(hyperparameters: &Mapping) -> (Mapping, Mapping) {
    let split = split_by_criteria(hyperparameters, crate::params::RESERVED_HYPERPARAMETERS);
    (split.included, split.excluded)
}

/// Contents of `resourceconfig.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Name of this container on the container network, e.g. `algo-1`.
    pub current_host: String,
    /// All containers in the cluster.
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface_name: Option<String>,
    /// Fields the harness does not interpret.
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ResourceConfig {
    /// Reads the file, sorts `hosts` and checks `current_host` is one of them.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = read_json(path)?;
        config.hosts.sort();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.current_host.trim().is_empty() {
            return Err(ConfigError::Invalid("current_host must not be empty".to_string()));
        }
        if !self.hosts.iter().any(|h| h == &self.current_host) {
            return Err(ConfigError::Invalid(format!(
                "current_host '{}' is not listed in hosts {:?}",
                self.current_host, self.hosts
            )));
        }
        Ok(())
    }
}

/// Descriptor of one input channel from `inputdataconfig.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    #[serde(rename = "ContentType", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(rename = "TrainingInputMode", default, skip_serializing_if = "Option::is_none")]
    pub training_input_mode: Option<String>,
    #[serde(rename = "S3DistributionType", default, skip_serializing_if = "Option::is_none")]
    pub distribution_type: Option<String>,
    #[serde(rename = "RecordWrapperType", default, skip_serializing_if = "Option::is_none")]
    pub record_wrapper_type: Option<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// Contents of `inputdataconfig.json`, keyed by channel name.
pub type InputDataConfig = BTreeMap<String, ChannelDescriptor>;

pub fn read_input_data_config(path: &Path) -> Result<InputDataConfig, ConfigError> {
    read_json(path)
}
