use std::path::Path;

use tracing::info;

use crate::{
    error::ServiceError,
    model::load_model_file,
    store::{ModelInfo, ModelStore},
};

/// Loads the model at `path` and registers it in `store` under `name`.
///
/// The file is fully decoded before anything is written, so an unreadable or
/// invalid model leaves the store untouched.
pub fn publish(path: &Path, name: &str, store: &ModelStore) -> Result<ModelInfo, ServiceError> {
    let loaded = load_model_file(path)?;
    info!(path = %path.display(), format = ?loaded.format, "loaded model");

    store.save(
        name,
        loaded.format,
        &loaded.bytes,
        loaded.model.input_width(),
        loaded.model.output_width(),
    )
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use tempfile::TempDir;

    use super::*;

    fn fixture() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/iris_model.json")
    }

    #[test]
    fn published_tag_resolves() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::open(dir.path()).unwrap();

        let info = publish(&fixture(), "flower_model", &store).unwrap();
        let stored = store.get(&info.tag).unwrap();
        assert_eq!(stored.info.tag, info.tag);
        assert_eq!(stored.read_bytes().unwrap(), fs::read(fixture()).unwrap());
        assert_eq!(info.input_width, Some(4));
        assert_eq!(info.output_width, Some(3));
    }

    #[test]
    fn missing_file_fails_before_save() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::open(dir.path()).unwrap();

        let err = publish(Path::new("final_iris_model.json.missing"), "flower_model", &store)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Load(_)));
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn invalid_model_fails_before_save() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::open(dir.path().join("store")).unwrap();
        let bad = dir.path().join("final_iris_model.json");
        fs::write(&bad, br#"{"format": "sequential", "input_dim": 4, "layers": []}"#).unwrap();

        assert!(publish(&bad, "flower_model", &store).is_err());
        assert!(store.list(None).unwrap().is_empty());
    }
}
