use std::io::Cursor;

use parking_lot::Mutex;
use tch::{Device, Kind, Tensor, no_grad};

use crate::{
    config::ComputeDevice,
    error::ServiceError,
    model::{Batch, Model},
};

impl From<ComputeDevice> for Device {
    fn from(device: ComputeDevice) -> Self {
        match device {
            ComputeDevice::Cpu => Device::Cpu,
            ComputeDevice::Cuda(idx) => Device::Cuda(idx),
        }
    }
}

/// Traced TorchScript classifier. Forward must map `[rows, features]` to
/// `[rows, classes]`.
pub struct TorchScriptModel {
    device: Device,
    module: Mutex<tch::CModule>,
}

impl TorchScriptModel {
    pub fn from_slice(bytes: &[u8], device: Device) -> Result<Self, ServiceError> {
        let mut reader = Cursor::new(bytes);
        let mut module = tch::CModule::load_data_on_device(&mut reader, device)
            .map_err(|e| ServiceError::Load(e.to_string()))?;
        module.set_eval();

        Ok(Self {
            device,
            module: Mutex::new(module),
        })
    }
}

impl Model for TorchScriptModel {
    fn predict(&self, input: &Batch) -> Result<Batch, ServiceError> {
        let [rows, cols] = input.shape();
        let output = no_grad(|| {
            let tensor = Tensor::from_slice(input.values())
                .reshape([rows as i64, cols as i64])
                .to(self.device);
            let module = self.module.lock();
            module
                .forward_ts(&[tensor])
                .map_err(|e| ServiceError::Inference(e.to_string()))
        })?;

        let size = output.size();
        let classes = match size.as_slice() {
            [r, c] if *r == rows as i64 => *c as usize,
            [c] if rows == 1 => *c as usize,
            other => {
                return Err(ServiceError::Inference(format!(
                    "unexpected model output shape {other:?}"
                )));
            }
        };
        let flat = output
            .to_kind(Kind::Float)
            .to(Device::Cpu)
            .flatten(0, -1);
        let values = Vec::<f32>::try_from(&flat)
            .map_err(|e| ServiceError::Inference(e.to_string()))?;

        Batch::new(rows, classes, values)
    }
}
