//! Harbor Serving
//!
//! Loads a model once per worker and answers `/ping` and `/invocations`
//! through the `model_fn`, `input_fn`, `predict_fn`, `output_fn` pipeline.

pub mod content;
pub mod error;
pub mod logging;
pub mod module;
pub mod process;
pub mod transformer;
pub mod worker;

pub use content::{Encoded, Payload};
pub use error::{ServingError, ServingResult};
pub use logging::RequestLoggerLayer;
pub use module::ServingModule;
pub use process::ProcessServingModule;
pub use transformer::Transformer;
pub use worker::{Worker, router};
