use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use tokio::fs;

use crate::dao::{
    models::RecordDocument,
    record_store::DocumentStore,
    storage::{StorageError, StorageResult},
};

/// Document store backed by a single JSON file, replaced atomically on write.
#[derive(Clone)]
pub struct JsonFileStore {
    path: Arc<PathBuf>,
}

impl JsonFileStore {
    /// Store the document at `path`; parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl DocumentStore for JsonFileStore {
    fn read(&self) -> BoxFuture<'static, StorageResult<RecordDocument>> {
        let path = self.path.clone();
        Box::pin(async move {
            let contents = match fs::read(path.as_path()).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Ok(RecordDocument::default());
                }
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("reading `{}`", path.display()),
                        err,
                    ));
                }
            };

            serde_json::from_slice(&contents).map_err(|err| {
                StorageError::malformed(format!("decoding `{}`", path.display()), err)
            })
        })
    }

    fn write(&self, document: RecordDocument) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(async move {
            let payload = serde_json::to_vec_pretty(&document).map_err(|err| {
                StorageError::malformed(format!("encoding `{}`", path.display()), err)
            })?;

            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|err| {
                    StorageError::unavailable(format!("creating `{}`", parent.display()), err)
                })?;
            }

            let temp = Self::temp_path(&path);
            fs::write(&temp, payload).await.map_err(|err| {
                StorageError::unavailable(format!("writing `{}`", temp.display()), err)
            })?;
            fs::rename(&temp, path.as_path()).await.map_err(|err| {
                StorageError::unavailable(format!("replacing `{}`", path.display()), err)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::TrainRecord;

    #[tokio::test]
    async fn missing_file_reads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("records.json"));

        assert_eq!(store.read().await.unwrap(), RecordDocument::default());
    }

    #[tokio::test]
    async fn written_document_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("records.json"));
        let document = RecordDocument {
            grace_records: vec![TrainRecord {
                length: 12,
                score: 345,
                participant_count: 6,
                timestamp: 1_700_000_000_000,
            }],
            hyped_records: Vec::new(),
        };

        store.write(document.clone()).await.unwrap();

        assert_eq!(store.read().await.unwrap(), document);
    }

    #[tokio::test]
    async fn garbage_file_is_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = JsonFileStore::new(path).read().await.unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
    }
}
