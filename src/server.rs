use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    classify::Classifier,
    config::{AppConfig, MultiRowPolicy},
    error::ServiceError,
    model::{InputArray, ModelMetadata, ModelRegistry},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub classifier: Arc<Classifier>,
}

#[derive(Serialize)]
struct MetadataResponse {
    service: String,
    model: ModelMetadata,
    labels: Vec<String>,
    multi_row_policy: MultiRowPolicy,
}

pub fn build_router(config: Arc<AppConfig>, registry: Arc<ModelRegistry>) -> Router {
    let classifier = Arc::new(Classifier::new(
        registry.runner(),
        config.labels.clone(),
        config.multi_row_policy,
    ));
    let state = AppState {
        config,
        registry,
        classifier,
    };

    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .route("/metadata", get(metadata))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

// Body is decoded by hand so malformed arrays surface as our own 400 instead
// of the extractor's rejection.
async fn classify(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<String>, ServiceError> {
    let input: InputArray = serde_json::from_slice(&body).map_err(|e| {
        ServiceError::InputValidation(format!("expected a 1-D or 2-D numeric array: {e}"))
    })?;
    let label = state.classifier.classify(input).await?;
    Ok(Json(label))
}

async fn metadata(State(state): State<AppState>) -> Json<MetadataResponse> {
    Json(MetadataResponse {
        service: state.config.service_name.clone(),
        model: state.registry.metadata().clone(),
        labels: state.classifier.labels().to_vec(),
        multi_row_policy: state.classifier.policy(),
    })
}
