use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Dense row-major `rows x cols` matrix of `f32`, the unit of exchange between
/// the service and a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl Batch {
    pub fn new(rows: usize, cols: usize, values: Vec<f32>) -> Result<Self, ServiceError> {
        if rows.checked_mul(cols) != Some(values.len()) {
            return Err(ServiceError::Inference(format!(
                "batch of shape [{rows}, {cols}] cannot hold {} values",
                values.len()
            )));
        }
        Ok(Self { rows, cols, values })
    }

    /// Builds a batch from equally sized rows of finite values.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, ServiceError> {
        let Some(first) = rows.first() else {
            return Err(ServiceError::InputValidation(
                "input array must not be empty".into(),
            ));
        };
        let cols = first.len();
        if cols == 0 {
            return Err(ServiceError::InputValidation(
                "input rows must not be empty".into(),
            ));
        }
        let mut values = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ServiceError::InputValidation(format!(
                    "row {idx} has {} values, expected {cols}",
                    row.len()
                )));
            }
            // out-of-range JSON numbers decode to infinity
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(ServiceError::InputValidation(format!(
                    "row {idx} column {col} is not a finite f32"
                )));
            }
            values.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        if idx >= self.rows {
            return None;
        }
        let start = idx * self.cols;
        Some(&self.values[start..start + self.cols])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + Clone {
        // chunks_exact panics on zero; a zero-width batch has no rows to yield
        self.values.chunks_exact(self.cols.max(1))
    }
}

/// Request payload: one sample or a batch of samples.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputArray {
    Single(Vec<f32>),
    Batch(Vec<Vec<f32>>),
}

impl InputArray {
    pub fn into_batch(self) -> Result<Batch, ServiceError> {
        match self {
            InputArray::Single(values) => Batch::from_rows(vec![values]),
            InputArray::Batch(rows) => Batch::from_rows(rows),
        }
    }
}

/// On-disk model formats understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Sequential,
    TorchScript,
}

impl ModelFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ModelFormat::Sequential => "json",
            ModelFormat::TorchScript => "pt",
        }
    }
}

/// What the service reports about the model it is serving.
#[derive(Debug, Clone, Serialize)]
pub struct ModelMetadata {
    pub tag: String,
    pub format: ModelFormat,
    pub size_bytes: u64,
    pub input_width: Option<usize>,
    pub output_width: Option<usize>,
}
