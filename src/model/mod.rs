mod loader;
mod registry;
mod runner;
mod sequential;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use loader::{LoadedModel, Model, format_for_path, load_model_bytes, load_model_file};
pub use registry::ModelRegistry;
pub use runner::{BlockingRunner, Runner};
pub use sequential::{Activation, SequentialModel};
pub use types::{Batch, InputArray, ModelFormat, ModelMetadata};
