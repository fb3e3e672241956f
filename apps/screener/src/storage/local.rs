use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{storage_path, FileStore, FileStoreError, UploadedFile};

/// Stores uploads on the local filesystem below a root directory.
/// Returned paths are relative to that root.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, FileStoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(FileStoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, source: std::io::Error) -> FileStoreError {
    if source.kind() == std::io::ErrorKind::NotFound {
        FileStoreError::NotFound(path.to_string())
    } else {
        FileStoreError::Io {
            path: path.to_string(),
            source,
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, destination: &str, file: &UploadedFile) -> Result<String, FileStoreError> {
        let path = storage_path(destination, &file.file_name);
        let absolute = self.resolve(&path)?;

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        tokio::fs::write(&absolute, &file.data)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(path = %path, bytes = file.data.len(), "Saved upload");
        Ok(path)
    }

    async fn read(&self, path: &str) -> Result<Bytes, FileStoreError> {
        let absolute = self.resolve(path)?;
        let data = tokio::fs::read(&absolute)
            .await
            .map_err(|e| io_error(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError> {
        let absolute = self.resolve(path)?;
        match tokio::fs::metadata(&absolute).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        let absolute = self.resolve(path)?;
        tokio::fs::remove_file(&absolute)
            .await
            .map_err(|e| io_error(path, e))
    }
}
