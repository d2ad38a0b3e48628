//! Harbor Core
//!
//! The container configuration contract shared by training and serving:
//! filesystem layout, configuration files, hyperparameter handling and the
//! runtime environment snapshot.

pub mod config;
pub mod environment;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod mapping;
pub mod params;
pub mod paths;
pub mod sentinel;
pub mod serving_env;
pub mod vars;

pub use config::{
    ChannelDescriptor, InputDataConfig, Mapping, ResourceConfig, Split, read_hyperparameters,
    read_json, split_by_criteria, split_hyperparameters,
};
pub use environment::{EnvironmentBuilder, RuntimeEnvironment};
pub use error::{ConfigError, CoreError, Result};
pub use logging::LogLevel;
pub use paths::ContainerPaths;
pub use serving_env::ServingEnvironment;
pub use vars::{ProcessEnv, VarSource};
