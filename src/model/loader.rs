use std::{fs, path::Path, sync::Arc};

use tracing::debug;

use crate::{
    config::ComputeDevice,
    error::ServiceError,
    model::{Batch, ModelFormat, sequential::SequentialModel},
};

/// A loaded classifier. Implementations are read-only once constructed and
/// may be shared across threads.
pub trait Model: Send + Sync {
    /// Maps a `[rows, features]` batch to `[rows, classes]` scores.
    fn predict(&self, input: &Batch) -> Result<Batch, ServiceError>;

    /// Number of features per row, when the format declares it.
    fn input_width(&self) -> Option<usize> {
        None
    }

    /// Number of scores per row, when the format declares it.
    fn output_width(&self) -> Option<usize> {
        None
    }
}

/// Raw model bytes together with the model decoded from them.
pub struct LoadedModel {
    pub format: ModelFormat,
    pub bytes: Vec<u8>,
    pub model: Arc<dyn Model>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("format", &self.format)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

pub fn format_for_path(path: &Path) -> Result<ModelFormat, ServiceError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => Ok(ModelFormat::Sequential),
        Some("pt") | Some("ts") => Ok(ModelFormat::TorchScript),
        _ => Err(ServiceError::Load(format!(
            "unrecognised model file extension: {}",
            path.display()
        ))),
    }
}

/// Reads a model file and decodes it in the format implied by its extension.
/// Loading happens on the CPU; this is used to validate files before storing.
pub fn load_model_file(path: &Path) -> Result<LoadedModel, ServiceError> {
    if !path.exists() {
        return Err(ServiceError::Load(format!(
            "model file missing: {}",
            path.display()
        )));
    }
    let format = format_for_path(path)?;
    let bytes = fs::read(path)
        .map_err(|e| ServiceError::Load(format!("cannot read {}: {e}", path.display())))?;
    debug!(path = %path.display(), size = bytes.len(), ?format, "read model file");
    load_model_bytes(format, bytes, ComputeDevice::Cpu)
}

pub fn load_model_bytes(
    format: ModelFormat,
    bytes: Vec<u8>,
    device: ComputeDevice,
) -> Result<LoadedModel, ServiceError> {
    let model: Arc<dyn Model> = match format {
        ModelFormat::Sequential => Arc::new(SequentialModel::from_slice(&bytes)?),
        ModelFormat::TorchScript => load_torchscript(&bytes, device)?,
    };
    Ok(LoadedModel {
        format,
        bytes,
        model,
    })
}

#[cfg(feature = "tch-backend")]
fn load_torchscript(bytes: &[u8], device: ComputeDevice) -> Result<Arc<dyn Model>, ServiceError> {
    Ok(Arc::new(super::tch_backend::TorchScriptModel::from_slice(
        bytes,
        device.into(),
    )?))
}

#[cfg(not(feature = "tch-backend"))]
fn load_torchscript(_bytes: &[u8], _device: ComputeDevice) -> Result<Arc<dyn Model>, ServiceError> {
    Err(ServiceError::Load(
        "TorchScript models require the `tch-backend` feature".into(),
    ))
}
