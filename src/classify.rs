//! Request path of the `classify` operation: validate, infer, arg-max, label.

use std::sync::Arc;

use crate::{
    config::MultiRowPolicy,
    error::ServiceError,
    model::{Batch, InputArray, Runner},
};

pub struct Classifier {
    runner: Arc<dyn Runner>,
    labels: Vec<String>,
    policy: MultiRowPolicy,
}

impl Classifier {
    pub fn new(runner: Arc<dyn Runner>, labels: Vec<String>, policy: MultiRowPolicy) -> Self {
        Self {
            runner,
            labels,
            policy,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn policy(&self) -> MultiRowPolicy {
        self.policy
    }

    pub async fn classify(&self, input: InputArray) -> Result<String, ServiceError> {
        let batch = input.into_batch()?;
        if let Some(expected) = self.runner.input_width() {
            if batch.cols() != expected {
                return Err(ServiceError::InputValidation(format!(
                    "expected {expected} features per row, got {}",
                    batch.cols()
                )));
            }
        }
        if self.policy == MultiRowPolicy::Reject && batch.rows() > 1 {
            return Err(ServiceError::InputValidation(format!(
                "expected a single sample, got {} rows",
                batch.rows()
            )));
        }

        let rows = batch.rows();
        let scores = self.runner.predict(batch).await?;
        if scores.rows() != rows {
            return Err(ServiceError::Inference(format!(
                "model returned {} rows for {rows} inputs",
                scores.rows()
            )));
        }

        // every row is inferred, row 0 decides the answer
        let class_idx = argmax_rows(&scores)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Inference("model returned no rows".into()))?;
        self.labels.get(class_idx).cloned().ok_or_else(|| {
            ServiceError::Inference(format!(
                "class index {class_idx} has no label ({} labels configured)",
                self.labels.len()
            ))
        })
    }
}

/// Index of the largest score in each row. Ties go to the lowest index.
pub fn argmax_rows(scores: &Batch) -> Result<Vec<usize>, ServiceError> {
    scores
        .iter_rows()
        .enumerate()
        .map(|(row_idx, row)| {
            let mut best: Option<(usize, f32)> = None;
            for (idx, &value) in row.iter().enumerate() {
                if value.is_nan() {
                    return Err(ServiceError::Inference(format!(
                        "model produced NaN in row {row_idx}"
                    )));
                }
                match best {
                    Some((_, top)) if value <= top => {}
                    _ => best = Some((idx, value)),
                }
            }
            best.map(|(idx, _)| idx)
                .ok_or_else(|| ServiceError::Inference("model returned empty rows".into()))
        })
        .collect()
}
