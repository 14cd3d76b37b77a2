use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use crate::{error::ServiceError, model::ModelFormat, store::Tag};

const INFO_FILE: &str = "model.json";
const BLOB_STEM: &str = "saved_model";
const LATEST_FILE: &str = "latest";
const VERSION_LEN: usize = 16;

/// Metadata persisted next to every stored model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub tag: Tag,
    pub format: ModelFormat,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub input_width: Option<usize>,
    pub output_width: Option<usize>,
}

/// A resolved entry of the store.
#[derive(Debug, Clone)]
pub struct StoredModel {
    pub info: ModelInfo,
    pub blob_path: PathBuf,
}

impl StoredModel {
    pub fn read_bytes(&self) -> Result<Vec<u8>, ServiceError> {
        Ok(fs::read(&self.blob_path)?)
    }
}

/// Directory-backed, content-addressed model store.
///
/// Layout: `<root>/<name>/<version>/{model.json, saved_model.<ext>}` plus
/// `<root>/<name>/latest` holding the newest version. Versions are derived
/// from the SHA-256 of the model bytes, so entries never change once written.
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            ServiceError::Store(format!("cannot create store at {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// Stores `bytes` under `name` and returns the info of the resulting
    /// entry. Saving identical bytes twice yields the same tag.
    pub fn save(
        &self,
        name: &str,
        format: ModelFormat,
        bytes: &[u8],
        input_width: Option<usize>,
        output_width: Option<usize>,
    ) -> Result<ModelInfo, ServiceError> {
        let sha256 = hex::encode(Sha256::digest(bytes));
        let version = sha256[..VERSION_LEN].to_string();
        let tag = Tag::new(name, Some(&version))?;

        let model_dir = self.root.join(name);
        let entry_dir = model_dir.join(&version);
        if entry_dir.join(INFO_FILE).exists() {
            debug!(%tag, "model already stored");
            let stored = self.read_entry(&tag, &entry_dir)?;
            self.write_latest(&model_dir, &version)?;
            return Ok(stored.info);
        }

        let info = ModelInfo {
            tag: tag.clone(),
            format,
            size_bytes: bytes.len() as u64,
            sha256,
            created_at: Utc::now(),
            input_width,
            output_width,
        };

        fs::create_dir_all(&model_dir)?;
        // dropping the guard removes whatever was not renamed into place
        let staging = Builder::new().prefix(".staging-").tempdir_in(&model_dir)?;
        fs::write(staging.path().join(blob_name(format)), bytes)?;
        fs::write(
            staging.path().join(INFO_FILE),
            serde_json::to_vec_pretty(&info)?,
        )?;

        match fs::rename(staging.path(), &entry_dir) {
            Ok(()) => {}
            // another writer stored the same content first
            Err(_) if entry_dir.join(INFO_FILE).exists() => {
                let stored = self.read_entry(&tag, &entry_dir)?;
                self.write_latest(&model_dir, &version)?;
                return Ok(stored.info);
            }
            Err(e) => {
                return Err(ServiceError::Store(format!(
                    "cannot commit {}: {e}",
                    entry_dir.display()
                )));
            }
        }
        self.write_latest(&model_dir, &version)?;

        info!(%tag, size = info.size_bytes, "saved model to store");
        Ok(info)
    }

    /// Resolves `tag` and checks that the stored bytes still match their digest.
    pub fn get(&self, tag: &Tag) -> Result<StoredModel, ServiceError> {
        let model_dir = self.root.join(tag.name());
        let version = match tag.version() {
            Some(v) => v.to_string(),
            None => self.read_latest(&model_dir, tag)?,
        };
        let resolved = Tag::new(tag.name(), Some(&version))?;
        let entry_dir = model_dir.join(&version);
        if !entry_dir.join(INFO_FILE).exists() {
            return Err(ServiceError::NotFound(resolved.to_string()));
        }

        let stored = self.read_entry(&resolved, &entry_dir)?;
        let bytes = stored.read_bytes()?;
        let digest = hex::encode(Sha256::digest(&bytes));
        if digest != stored.info.sha256 {
            return Err(ServiceError::Store(format!(
                "{resolved} is corrupted: digest {digest} does not match {}",
                stored.info.sha256
            )));
        }
        Ok(stored)
    }

    /// Lists stored models, optionally restricted to one name, oldest first.
    pub fn list(&self, name: Option<&str>) -> Result<Vec<ModelInfo>, ServiceError> {
        let names = match name {
            Some(n) => vec![n.to_string()],
            None => subdirectories(&self.root)?,
        };

        let mut infos = Vec::new();
        for name in names {
            let model_dir = self.root.join(&name);
            if !model_dir.is_dir() {
                continue;
            }
            for version in subdirectories(&model_dir)? {
                if version.starts_with('.') {
                    continue;
                }
                let tag = Tag::new(&name, Some(&version))?;
                let entry_dir = model_dir.join(&version);
                if entry_dir.join(INFO_FILE).exists() {
                    infos.push(self.read_entry(&tag, &entry_dir)?.info);
                }
            }
        }
        infos.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tag.to_string().cmp(&b.tag.to_string()))
        });
        Ok(infos)
    }

    fn read_entry(&self, tag: &Tag, entry_dir: &Path) -> Result<StoredModel, ServiceError> {
        let raw = fs::read(entry_dir.join(INFO_FILE))?;
        let info: ModelInfo = serde_json::from_slice(&raw)
            .map_err(|e| ServiceError::Store(format!("unreadable metadata for {tag}: {e}")))?;
        if &info.tag != tag {
            return Err(ServiceError::Store(format!(
                "metadata at {} names {} instead of {tag}",
                entry_dir.display(),
                info.tag
            )));
        }
        let blob_path = entry_dir.join(blob_name(info.format));
        if !blob_path.exists() {
            return Err(ServiceError::Store(format!("{tag} has no model blob")));
        }
        Ok(StoredModel { info, blob_path })
    }

    fn read_latest(&self, model_dir: &Path, tag: &Tag) -> Result<String, ServiceError> {
        match fs::read_to_string(model_dir.join(LATEST_FILE)) {
            Ok(v) => Ok(v.trim().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ServiceError::NotFound(tag.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_latest(&self, model_dir: &Path, version: &str) -> Result<(), ServiceError> {
        let mut tmp = NamedTempFile::new_in(model_dir)?;
        tmp.write_all(version.as_bytes())?;
        tmp.persist(model_dir.join(LATEST_FILE))
            .map_err(|e| ServiceError::Io(e.error))?;
        Ok(())
    }
}

fn blob_name(format: ModelFormat) -> String {
    format!("{BLOB_STEM}.{}", format.extension())
}

fn subdirectories(dir: &Path) -> Result<Vec<String>, ServiceError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const MODEL_A: &[u8] = br#"{"format":"sequential","input_dim":1,"layers":[{"units":1,"kernel":[[1]],"bias":[0]}]}"#;
    const MODEL_B: &[u8] = br#"{"format":"sequential","input_dim":1,"layers":[{"units":1,"kernel":[[2]],"bias":[0]}]}"#;

    fn store() -> (TempDir, ModelStore) {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::open(dir.path().join("models")).unwrap();
        (dir, store)
    }

    #[test]
    fn saved_tag_resolves() {
        let (_dir, store) = store();
        let info = store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, Some(1), Some(1))
            .unwrap();
        assert_eq!(info.tag.name(), "flower_model");
        assert_eq!(info.tag.version().unwrap().len(), VERSION_LEN);

        let stored = store.get(&info.tag).unwrap();
        assert_eq!(stored.info, info);
        assert_eq!(stored.read_bytes().unwrap(), MODEL_A);
    }

    #[test]
    fn identical_content_yields_identical_tag() {
        let (_dir, store) = store();
        let first = store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap();
        let second = store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap();
        let other = store
            .save("flower_model", ModelFormat::Sequential, MODEL_B, None, None)
            .unwrap();
        assert_eq!(first.tag, second.tag);
        assert_eq!(first.created_at, second.created_at);
        assert_ne!(first.tag, other.tag);
        assert_eq!(store.list(Some("flower_model")).unwrap().len(), 2);
    }

    #[test]
    fn latest_tracks_most_recent_save() {
        let (_dir, store) = store();
        store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap();
        let b = store
            .save("flower_model", ModelFormat::Sequential, MODEL_B, None, None)
            .unwrap();

        let latest: Tag = "flower_model".parse().unwrap();
        assert_eq!(store.get(&latest).unwrap().info.tag, b.tag);
    }

    #[test]
    fn missing_tags_are_not_found() {
        let (_dir, store) = store();
        let tag: Tag = "flower_model:cuh4o3gokoxi75fv".parse().unwrap();
        assert!(matches!(store.get(&tag), Err(ServiceError::NotFound(_))));
        let latest: Tag = "flower_model".parse().unwrap();
        assert!(matches!(store.get(&latest), Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn tampered_blob_is_detected() {
        let (_dir, store) = store();
        let info = store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap();
        let stored = store.get(&info.tag).unwrap();
        fs::write(&stored.blob_path, MODEL_B).unwrap();

        let err = store.get(&info.tag).unwrap_err();
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn list_spans_names() {
        let (_dir, store) = store();
        store
            .save("flower_model", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap();
        store
            .save("other_model", ModelFormat::Sequential, MODEL_B, None, None)
            .unwrap();
        let names: Vec<String> = store
            .list(None)
            .unwrap()
            .into_iter()
            .map(|i| i.tag.name().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"flower_model".to_string()));
        assert!(names.contains(&"other_model".to_string()));
        assert!(store.list(Some("absent")).unwrap().is_empty());
    }

    #[test]
    fn concurrent_saves_of_same_content_agree() {
        let (_dir, store) = store();
        for _ in 0..20 {
            let tags: Vec<Tag> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|i| {
                        let store = &store;
                        let bytes = if i % 2 == 0 { MODEL_A } else { MODEL_B };
                        scope.spawn(move || {
                            store
                                .save("flower_model", ModelFormat::Sequential, bytes, None, None)
                                .map(|info| info.tag)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap().unwrap())
                    .collect()
            });
            assert_eq!(tags[0], tags[2]);
            assert_eq!(tags[1], tags[3]);
        }

        assert_eq!(store.list(Some("flower_model")).unwrap().len(), 2);
        let latest: Tag = "flower_model".parse().unwrap();
        assert!(store.get(&latest).is_ok());
        let leftovers: Vec<_> = fs::read_dir(store.root.join("flower_model"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "staging leftovers: {leftovers:?}");
    }

    #[test]
    fn invalid_names_are_rejected_before_writing() {
        let (_dir, store) = store();
        let err = store
            .save("../outside", ModelFormat::Sequential, MODEL_A, None, None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTag(_)));
        assert!(store.list(None).unwrap().is_empty());
    }
}
