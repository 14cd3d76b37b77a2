//! Feed-forward classifier stored as a stack of dense layers.
//!
//! Weights follow the Keras layout: each kernel is `inputs x units`, so a
//! layer computes `activation(x . kernel + bias)`.

use serde::Deserialize;

use crate::{
    error::ServiceError,
    model::{Batch, Model},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(self, row: &mut [f32]) {
        match self {
            Activation::Linear => {}
            Activation::Relu => row.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Sigmoid => row.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
            Activation::Tanh => row.iter_mut().for_each(|v| *v = v.tanh()),
            Activation::Softmax => {
                let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in row.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                if sum > 0.0 {
                    row.iter_mut().for_each(|v| *v /= sum);
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DenseSpec {
    units: usize,
    #[serde(default = "default_activation")]
    activation: Activation,
    kernel: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

fn default_activation() -> Activation {
    Activation::Linear
}

#[derive(Debug, Deserialize)]
struct SequentialSpec {
    format: String,
    input_dim: usize,
    layers: Vec<DenseSpec>,
}

#[derive(Debug, Clone)]
struct Dense {
    inputs: usize,
    units: usize,
    activation: Activation,
    // row-major `inputs x units`
    kernel: Vec<f32>,
    bias: Vec<f32>,
}

impl Dense {
    fn forward(&self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.bias);
        for (i, x) in input.iter().enumerate() {
            let weights = &self.kernel[i * self.units..(i + 1) * self.units];
            for (o, w) in out.iter_mut().zip(weights) {
                *o += x * w;
            }
        }
        self.activation.apply(out);
    }
}

#[derive(Debug, Clone)]
pub struct SequentialModel {
    input_dim: usize,
    layers: Vec<Dense>,
}

impl SequentialModel {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ServiceError> {
        let spec: SequentialSpec = serde_json::from_slice(bytes)
            .map_err(|e| ServiceError::Load(format!("invalid sequential model: {e}")))?;
        Self::from_spec(spec)
    }

    fn from_spec(spec: SequentialSpec) -> Result<Self, ServiceError> {
        if spec.format != "sequential" {
            return Err(ServiceError::Load(format!(
                "unsupported model format '{}'",
                spec.format
            )));
        }
        if spec.input_dim == 0 {
            return Err(ServiceError::Load("input_dim must be positive".into()));
        }
        if spec.layers.is_empty() {
            return Err(ServiceError::Load("model has no layers".into()));
        }

        let mut inputs = spec.input_dim;
        let mut layers = Vec::with_capacity(spec.layers.len());
        for (idx, layer) in spec.layers.into_iter().enumerate() {
            if layer.units == 0 {
                return Err(ServiceError::Load(format!("layer {idx} has zero units")));
            }
            if layer.kernel.len() != inputs {
                return Err(ServiceError::Load(format!(
                    "layer {idx} kernel has {} rows, expected {inputs}",
                    layer.kernel.len()
                )));
            }
            if let Some(bad) = layer.kernel.iter().position(|row| row.len() != layer.units) {
                return Err(ServiceError::Load(format!(
                    "layer {idx} kernel row {bad} does not have {} columns",
                    layer.units
                )));
            }
            if layer.bias.len() != layer.units {
                return Err(ServiceError::Load(format!(
                    "layer {idx} bias has {} values, expected {}",
                    layer.bias.len(),
                    layer.units
                )));
            }
            layers.push(Dense {
                inputs,
                units: layer.units,
                activation: layer.activation,
                kernel: layer.kernel.into_iter().flatten().collect(),
                bias: layer.bias,
            });
            inputs = layer.units;
        }

        Ok(Self {
            input_dim: spec.input_dim,
            layers,
        })
    }
}

impl Model for SequentialModel {
    fn predict(&self, input: &Batch) -> Result<Batch, ServiceError> {
        if input.cols() != self.input_dim {
            return Err(ServiceError::InputValidation(format!(
                "expected {} features per row, got {}",
                self.input_dim,
                input.cols()
            )));
        }

        let out_width = self.layers.last().map(|l| l.units).unwrap_or(self.input_dim);
        let mut output = Vec::with_capacity(input.rows() * out_width);
        let mut current = Vec::new();
        let mut next = Vec::new();
        for row in input.iter_rows() {
            current.clear();
            current.extend_from_slice(row);
            for layer in &self.layers {
                debug_assert_eq!(current.len(), layer.inputs);
                layer.forward(&current, &mut next);
                std::mem::swap(&mut current, &mut next);
            }
            output.extend_from_slice(&current);
        }

        Batch::new(input.rows(), out_width, output)
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.input_dim)
    }

    fn output_width(&self) -> Option<usize> {
        self.layers.last().map(|l| l.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer() -> SequentialModel {
        let raw = r#"{
            "format": "sequential",
            "input_dim": 2,
            "layers": [
                {"units": 2, "activation": "relu", "kernel": [[1, -1], [1, -1]], "bias": [0, 0]},
                {"units": 3, "activation": "softmax", "kernel": [[1, 0, 0], [0, 1, 0]], "bias": [0, 0, 0]}
            ]
        }"#;
        SequentialModel::from_slice(raw.as_bytes()).unwrap()
    }

    #[test]
    fn forward_pass_applies_layers_in_order() {
        let model = two_layer();
        let batch = Batch::from_rows(vec![vec![1.0, 2.0], vec![-1.0, -2.0]]).unwrap();
        let out = model.predict(&batch).unwrap();
        assert_eq!(out.shape(), [2, 3]);

        // row 0: hidden = relu([3, -3]) = [3, 0]
        let row = out.row(0).unwrap();
        assert!(row[0] > row[1] && row[0] > row[2]);
        // row 1: hidden = relu([-3, 3]) = [0, 3]
        let row = out.row(1).unwrap();
        assert!(row[1] > row[0] && row[1] > row[2]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let model = two_layer();
        let batch = Batch::from_rows(vec![vec![0.3, 0.9]]).unwrap();
        let out = model.predict(&batch).unwrap();
        let sum: f32 = out.row(0).unwrap().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn wrong_feature_count_is_validation_error() {
        let model = two_layer();
        let batch = Batch::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(
            model.predict(&batch),
            Err(ServiceError::InputValidation(_))
        ));
    }

    #[test]
    fn reports_widths() {
        let model = two_layer();
        assert_eq!(model.input_width(), Some(2));
        assert_eq!(model.output_width(), Some(3));
    }

    #[test]
    fn mismatched_kernel_fails_to_load() {
        let raw = r#"{
            "format": "sequential",
            "input_dim": 3,
            "layers": [{"units": 2, "kernel": [[1, 1], [1, 1]], "bias": [0, 0]}]
        }"#;
        let err = SequentialModel::from_slice(raw.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("kernel has 2 rows"));
    }

    #[test]
    fn mismatched_bias_fails_to_load() {
        let raw = r#"{
            "format": "sequential",
            "input_dim": 1,
            "layers": [{"units": 2, "kernel": [[1, 1]], "bias": [0]}]
        }"#;
        assert!(matches!(
            SequentialModel::from_slice(raw.as_bytes()),
            Err(ServiceError::Load(_))
        ));
    }

    #[test]
    fn non_model_content_fails_to_load() {
        assert!(SequentialModel::from_slice(b"\x89HDF\r\n").is_err());
        let wrong_format = br#"{"format": "functional", "input_dim": 1, "layers": []}"#;
        assert!(SequentialModel::from_slice(wrong_format).is_err());
    }
}
