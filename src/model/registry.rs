use std::sync::Arc;

use tracing::info;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{BlockingRunner, ModelMetadata, Runner, load_model_bytes},
    store::ModelStore,
};

/// The single model a service instance serves, resolved once at startup.
pub struct ModelRegistry {
    runner: Arc<dyn Runner>,
    metadata: ModelMetadata,
}

impl ModelRegistry {
    /// Resolves the configured tag from the store and wraps the model in a
    /// runner. Any failure here is fatal for the service.
    pub fn initialize(config: &AppConfig) -> Result<Self, ServiceError> {
        let store = ModelStore::open(&config.store_path)?;
        let stored = store.get(&config.model_tag)?;
        info!(tag = %stored.info.tag, format = ?stored.info.format, "resolved model from store");

        let loaded = load_model_bytes(stored.info.format, stored.read_bytes()?, config.device)?;
        let metadata = ModelMetadata {
            tag: stored.info.tag.to_string(),
            format: loaded.format,
            size_bytes: stored.info.size_bytes,
            input_width: loaded.model.input_width(),
            output_width: loaded.model.output_width(),
        };

        Self::from_runner(
            Arc::new(BlockingRunner::new(loaded.model)),
            metadata,
            config.labels.len(),
        )
    }

    pub fn from_runner(
        runner: Arc<dyn Runner>,
        metadata: ModelMetadata,
        label_count: usize,
    ) -> Result<Self, ServiceError> {
        if let Some(width) = runner.output_width() {
            if width != label_count {
                return Err(ServiceError::Load(format!(
                    "model {} produces {width} scores but {label_count} labels are configured",
                    metadata.tag
                )));
            }
        }
        Ok(Self { runner, metadata })
    }

    pub fn runner(&self) -> Arc<dyn Runner> {
        self.runner.clone()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::{ComputeDevice, MultiRowPolicy},
        model::load_model_file,
    };

    fn config_for(store: &Path, tag: &str, labels: &[&str]) -> AppConfig {
        AppConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            service_name: "test".into(),
            store_path: store.to_path_buf(),
            model_tag: tag.parse().unwrap(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            multi_row_policy: MultiRowPolicy::FirstRow,
            device: ComputeDevice::Cpu,
        }
    }

    fn publish_fixture(store_path: &Path) -> String {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/iris_model.json");
        let loaded = load_model_file(&fixture).unwrap();
        let store = ModelStore::open(store_path).unwrap();
        store
            .save(
                "flower_model",
                loaded.format,
                &loaded.bytes,
                loaded.model.input_width(),
                loaded.model.output_width(),
            )
            .unwrap()
            .tag
            .to_string()
    }

    #[test]
    fn resolves_published_model() {
        let dir = TempDir::new().unwrap();
        let tag = publish_fixture(dir.path());
        let config = config_for(dir.path(), &tag, &["setosa", "versicolor", "virginica"]);

        let registry = ModelRegistry::initialize(&config).unwrap();
        assert_eq!(registry.metadata().tag, tag);
        assert_eq!(registry.metadata().input_width, Some(4));
    }

    #[test]
    fn missing_tag_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = config_for(
            dir.path(),
            "flower_model:cuh4o3gokoxi75fv",
            &["setosa", "versicolor", "virginica"],
        );
        let err = ModelRegistry::initialize(&config).err().unwrap();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn label_count_must_match_model_output() {
        let dir = TempDir::new().unwrap();
        let tag = publish_fixture(dir.path());
        let config = config_for(dir.path(), &tag, &["setosa", "versicolor"]);
        let err = ModelRegistry::initialize(&config).err().unwrap();
        assert!(err.to_string().contains("2 labels"));
    }
}
