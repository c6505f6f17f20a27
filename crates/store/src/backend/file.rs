//! Local file store: one JSON document per collection.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{Collection, StoreError};
use crate::config::Durability;

/// File-backed collection store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

#[derive(Debug)]
struct FileStoreInner {
    dir: PathBuf,
    durability: Durability,
}

impl FileStore {
    /// Create a store rooted at `dir`. Nothing is touched on disk until the
    /// first load or save.
    #[must_use]
    pub fn new(dir: PathBuf, durability: Durability) -> Self {
        Self {
            inner: Arc::new(FileStoreInner { dir, durability }),
        }
    }

    /// Data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Durability mode for writes.
    #[must_use]
    pub fn durability(&self) -> Durability {
        self.inner.durability
    }

    /// Path of a collection file.
    #[must_use]
    pub fn path(&self, collection: Collection) -> PathBuf {
        self.inner.dir.join(format!("{}.json", collection.name()))
    }

    /// Load a collection document.
    ///
    /// A missing file is created holding the empty document for the
    /// collection's shape, and reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or is not JSON.
    pub async fn load(&self, collection: Collection) -> Result<Option<Value>, StoreError> {
        let path = self.path(collection);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Err(e) = self.write(&path, &collection.shape().empty()).await {
                    debug!(error = %e, collection = %collection, "Could not create collection file");
                }
                Ok(None)
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Save a collection document.
    ///
    /// # Errors
    ///
    /// In [`Durability::Strict`] mode returns error if the file could not be
    /// written and renamed into place. In [`Durability::BestEffort`] mode the
    /// failure is logged and `Ok(())` is returned.
    pub async fn save(&self, collection: Collection, value: &Value) -> Result<(), StoreError> {
        let path = self.path(collection);
        match self.write(&path, value).await {
            Ok(()) => Ok(()),
            Err(e) => match self.inner.durability {
                Durability::Strict => Err(e),
                Durability::BestEffort => {
                    warn!(
                        error = %e,
                        collection = %collection,
                        "Collection write failed, change is not durable"
                    );
                    Ok(())
                }
            },
        }
    }

    /// Write `value` to a temporary sibling, flush it to disk and rename it
    /// over `path`, so readers never see a half-written document.
    async fn write(&self, path: &Path, value: &Value) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            path: path.to_owned(),
            source,
        };

        fs::create_dir_all(&self.inner.dir).await.map_err(io)?;

        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            fs::rename(&tmp, path).await
        }
        .await;

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(io(source));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::Backend;

    #[tokio::test]
    async fn test_load_missing_creates_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("data"), Durability::Strict);

        assert!(store.load(Collection::Products).await.unwrap().is_none());
        assert!(store.load(Collection::Users).await.unwrap().is_none());

        let products = std::fs::read_to_string(store.path(Collection::Products)).unwrap();
        let users = std::fs::read_to_string(store.path(Collection::Users)).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&products).unwrap(), json!([]));
        assert_eq!(serde_json::from_str::<Value>(&users).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_owned(), Durability::Strict);
        let doc = json!([{"id": "ORD-1", "total": "1500"}]);

        store.save(Collection::Orders, &doc).await.unwrap();

        assert_eq!(store.load(Collection::Orders).await.unwrap(), Some(doc));
        assert!(dir.path().join("orders.json").exists());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_owned(), Durability::Strict);
        store.save(Collection::Messages, &json!([])).await.unwrap();
        store.save(Collection::Messages, &json!([{"id": "MSG-1"}])).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["messages.json".to_owned()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_owned(), Durability::Strict);
        std::fs::write(store.path(Collection::Settings), "{not json").unwrap();

        assert!(matches!(
            store.load(Collection::Settings).await,
            Err(StoreError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_strict_write_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be makes every write fail
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "").unwrap();
        let store = FileStore::new(blocker, Durability::Strict);

        let err = store.save(Collection::Orders, &json!([])).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn test_best_effort_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "").unwrap();
        let store = FileStore::new(blocker, Durability::BestEffort);

        store.save(Collection::Orders, &json!([])).await.unwrap();
    }

    #[test]
    fn test_durability_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let strict = FileStore::new(dir.path().to_owned(), Durability::Strict);
        let relaxed = FileStore::new(dir.path().to_owned(), Durability::BestEffort);

        assert_eq!(strict.durability(), Durability::Strict);
        assert!(Backend::Local(strict).is_durable());
        assert!(!Backend::Local(relaxed).is_durable());
    }
}
