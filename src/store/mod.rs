mod local;
mod tag;

pub use local::{ModelInfo, ModelStore, StoredModel};
pub use tag::{LATEST, Tag};
