//! Harbor Training
//!
//! Fetches, installs and runs the user training entry point inside a training
//! container, and records the outcome for the orchestrator.

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod install;
pub mod matcher;
pub mod metrics;
pub mod module;
pub mod script;
pub mod storage;

pub use dispatch::{DispatchMode, Dispatched, EntryPoint, EntryPointKind, Invocation};
pub use engine::{TrainingEngine, TrainingReport, TrainingState};
pub use error::{TrainingError, TrainingResult};
pub use fetch::{FetchOutcome, Locator, fetch, fetch_and_install};
pub use install::{InstallPolicy, Installer};
pub use matcher::{ArgumentError, Arguments, ParameterDescriptor, matching_args};
pub use metrics::MetricsAgent;
pub use module::{
    FnModule, Model, ModuleCapabilities, ModuleLoader, ModuleRegistry, TrainableModule,
};
pub use script::{ScriptLoader, ScriptModule};
pub use storage::{HttpObjectStore, ObjectStore};
