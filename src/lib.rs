pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod publisher;
pub mod server;
pub mod store;

pub use classify::Classifier;
pub use config::{AppConfig, ComputeDevice, MultiRowPolicy, PublishConfig};
pub use error::ServiceError;
pub use model::{Batch, InputArray, ModelRegistry, Runner};
pub use publisher::publish;
pub use server::build_router;
pub use store::{ModelInfo, ModelStore, Tag};

/// Installs the fmt subscriber shared by both binaries.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
