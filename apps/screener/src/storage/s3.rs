use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::debug;

use super::{storage_path, FileStore, FileStoreError, UploadedFile};

/// Stores uploads as objects in one bucket. Paths are object keys.
pub struct S3FileStore {
    client: S3Client,
    bucket: String,
}

impl S3FileStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn save(&self, destination: &str, file: &UploadedFile) -> Result<String, FileStoreError> {
        let key = storage_path(destination, &file.file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(file.data.clone()))
            .send()
            .await
            .map_err(|e| FileStoreError::S3(format!("put {key}: {e}")))?;

        debug!("Uploaded s3://{}/{} ({} bytes)", self.bucket, key, file.data.len());
        Ok(key)
    }

    async fn read(&self, path: &str) -> Result<Bytes, FileStoreError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    FileStoreError::NotFound(path.to_string())
                } else {
                    FileStoreError::S3(format!("get {path}: {e}"))
                }
            })?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| FileStoreError::S3(format!("read body {path}: {e}")))?;
        Ok(data.into_bytes())
    }

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => {
                Ok(false)
            }
            Err(e) => Err(FileStoreError::S3(format!("head {path}: {e}"))),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), FileStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| FileStoreError::S3(format!("delete {path}: {e}")))?;
        Ok(())
    }
}
