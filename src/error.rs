use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("model not found in store: {0}")]
    NotFound(String),
    #[error("invalid tag: {0}")]
    InvalidTag(String),
    #[error("model store error: {0}")]
    Store(String),
    #[error("invalid input: {0}")]
    InputValidation(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InputValidation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Load(_)
            | ServiceError::InvalidTag(_)
            | ServiceError::Store(_)
            | ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Io(_) | ServiceError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
