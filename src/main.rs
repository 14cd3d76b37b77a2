use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use iris_model_service::{AppConfig, ModelRegistry, build_router, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(
        service = %config.service_name,
        tag = %config.model_tag,
        store = %config.store_path.display(),
        "resolving model"
    );

    let registry = Arc::new(
        ModelRegistry::initialize(config.as_ref())
            .with_context(|| format!("cannot serve {}", config.model_tag))?,
    );
    let router = build_router(config.clone(), registry);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}
