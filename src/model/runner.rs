use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;

use crate::{
    error::ServiceError,
    model::{Batch, Model},
};

/// Per-request execution wrapper around a model.
///
/// `predict` is the only suspension point of a request: implementations must
/// run the model off the async executor so that awaiting the returned future
/// lets other requests make progress.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn predict(&self, input: Batch) -> Result<Batch, ServiceError>;

    fn input_width(&self) -> Option<usize> {
        None
    }

    fn output_width(&self) -> Option<usize> {
        None
    }
}

/// Runs the wrapped model on tokio's blocking thread pool.
#[derive(Clone)]
pub struct BlockingRunner {
    model: Arc<dyn Model>,
}

impl BlockingRunner {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Runner for BlockingRunner {
    async fn predict(&self, input: Batch) -> Result<Batch, ServiceError> {
        let model = self.model.clone();
        task::spawn_blocking(move || model.predict(&input))
            .await
            .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))?
    }

    fn input_width(&self) -> Option<usize> {
        self.model.input_width()
    }

    fn output_width(&self) -> Option<usize> {
        self.model.output_width()
    }
}
