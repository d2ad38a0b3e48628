//! Argument matching between a user callable and the environment.
//!
//! A callable announces the names it accepts through a [`ParameterDescriptor`].
//! [`matching_args`] then hands it exactly those entries of the candidate
//! mapping, or the whole mapping when the callable collects everything.

use harbor_core::Mapping;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Marker prefix of a catch-all entry in a declared parameter list.
pub const CATCH_ALL_PREFIX: &str = "**";

/// The parameters a callable declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterDescriptor {
    names: Vec<String>,
    catch_all: bool,
}

impl ParameterDescriptor {
    /// A callable taking exactly `names`.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { names: names.into_iter().map(Into::into).collect(), catch_all: false }
    }

    /// A callable accepting any keyword.
    pub fn catch_all() -> Self {
        Self { names: Vec::new(), catch_all: true }
    }

    /// Parses a declared list where an entry such as `**kwargs` marks a
    /// catch-all. The marker itself is not a parameter name.
    pub fn from_declared<I, S>(declared: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut descriptor = Self::default();
        for entry in declared {
            let entry = entry.as_ref().trim();
            if entry.starts_with(CATCH_ALL_PREFIX) {
                descriptor.catch_all = true;
            } else if !entry.is_empty() {
                descriptor.names.push(entry.to_string());
            }
        }
        descriptor
    }

    #[must_use]
    pub fn with_catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    /// Declared names, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_catch_all(&self) -> bool {
        self.catch_all
    }
}

/// Selects the entries of `candidates` the callable accepts.
///
/// Declared names absent from `candidates` are not an error here; the callable
/// sees them as missing when it asks for them.
pub fn matching_args(descriptor: &ParameterDescriptor, candidates: &Mapping) -> Mapping {
    if descriptor.catch_all {
        return candidates.clone();
    }
    descriptor
        .names
        .iter()
        .filter_map(|name| candidates.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("missing required argument '{0}'")]
    Missing(String),

    #[error("argument '{name}' has an unexpected shape: {source}")]
    Invalid {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The matched arguments handed to a user callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Mapping);

impl Arguments {
    pub fn new(values: Mapping) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Result<&Value, ArgumentError> {
        self.0.get(name).ok_or_else(|| ArgumentError::Missing(name.to_string()))
    }

    /// Deserializes a required argument.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgumentError> {
        let value = self.get(name)?;
        serde_json::from_value(value.clone())
            .map_err(|source| ArgumentError::Invalid { name: name.to_string(), source })
    }

    pub fn optional(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn into_inner(self) -> Mapping {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn env() -> Mapping {
        json!({"x": 1, "y": 2, "z": 3}).as_object().cloned().unwrap()
    }

    #[test]
    fn test_named_parameters_select_subset() {
        let matched = matching_args(&ParameterDescriptor::new(["x", "y"]), &env());
        assert_eq!(Value::Object(matched), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn test_catch_all_returns_everything() {
        let matched = matching_args(&ParameterDescriptor::catch_all(), &env());
        assert_eq!(matched, env());

        let matched = matching_args(&ParameterDescriptor::new(["x"]).with_catch_all(), &env());
        assert_eq!(matched, env());
    }

    #[test]
    fn test_declared_list_with_marker() {
        let descriptor = ParameterDescriptor::from_declared(["hyperparameters", "**kwargs"]);
        assert!(descriptor.has_catch_all());
        assert_eq!(descriptor.names(), ["hyperparameters"]);
    }

    #[test]
    fn test_absent_parameter_surfaces_on_use() {
        let matched = matching_args(&ParameterDescriptor::new(["x", "w"]), &env());
        let args = Arguments::new(matched);
        assert_eq!(args.len(), 1);
        assert!(matches!(args.get("w"), Err(ArgumentError::Missing(name)) if name == "w"));
    }

    #[test]
    fn test_get_as_deserializes() {
        let mapping = json!({"dirs": {"train": "/opt/ml/input/data/train"}});
        let args = Arguments::new(mapping.as_object().cloned().unwrap());
        let dirs: BTreeMap<String, String> = args.get_as("dirs").unwrap();
        assert_eq!(dirs["train"], "/opt/ml/input/data/train");

        let err = args.get_as::<Vec<u8>>("dirs").unwrap_err();
        assert!(matches!(err, ArgumentError::Invalid { .. }));
    }
}
