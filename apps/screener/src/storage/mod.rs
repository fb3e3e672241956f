//! Raw résumé file storage.
//!
//! Uploads are written under a destination directory (or key prefix) with a
//! collision-free name and read back by the returned path.

mod local;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

pub use local::LocalFileStore;
pub use s3::S3FileStore;

/// Destination directory for screened résumé uploads.
pub const RESUME_DESTINATION: &str = "resumes";

/// A file as received from the client, before it is saved anywhere.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("S3 error: {0}")]
    S3(String),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Saves one upload under `destination` and returns its storage path.
    async fn save(&self, destination: &str, file: &UploadedFile) -> Result<String, FileStoreError>;

    async fn read(&self, path: &str) -> Result<Bytes, FileStoreError>;

    async fn exists(&self, path: &str) -> Result<bool, FileStoreError>;

    async fn remove(&self, path: &str) -> Result<(), FileStoreError>;

    /// Saves every upload, reporting each result separately so one bad file
    /// does not sink the rest.
    async fn save_all(
        &self,
        destination: &str,
        files: &[UploadedFile],
    ) -> Vec<Result<String, FileStoreError>> {
        let mut saved = Vec::with_capacity(files.len());
        for file in files {
            saved.push(self.save(destination, file).await);
        }
        saved
    }

    async fn read_all(&self, paths: &[String]) -> Vec<Result<Bytes, FileStoreError>> {
        let mut contents = Vec::with_capacity(paths.len());
        for path in paths {
            contents.push(self.read(path).await);
        }
        contents
    }
}

/// Builds the stored name for an upload: `<uuid>-<sanitized original name>`.
fn stored_file_name(original: &str) -> String {
    format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original))
}

/// Path (or object key) an upload is stored under: `<destination>/<stored name>`,
/// or just the stored name when the destination is empty.
pub fn storage_path(destination: &str, original: &str) -> String {
    let name = stored_file_name(original);
    match destination.trim_matches('/') {
        "" => name,
        dir => format!("{dir}/{name}"),
    }
}

/// Keeps only the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\ana\\cv.pdf"), "cv.pdf");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_file_name("João Silva (CV).pdf"), "Jo_o_Silva__CV_.pdf");
    }

    #[test]
    fn test_sanitize_never_returns_hidden_or_empty_names() {
        assert_eq!(sanitize_file_name(".env"), "env");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("dir/"), "upload");
    }

    #[test]
    fn test_stored_file_names_are_unique() {
        let a = stored_file_name("cv.pdf");
        let b = stored_file_name("cv.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("-cv.pdf"));
    }

    #[test]
    fn test_storage_path_joins_destination_without_stray_slashes() {
        let path = storage_path("/resumes/", "../Ana CV.pdf");
        let (dir, name) = path.split_once('/').unwrap();
        assert_eq!(dir, "resumes");
        assert!(name.ends_with("-Ana_CV.pdf"));

        let bare = storage_path("", "cv.txt");
        assert!(!bare.contains('/'));
        assert!(bare.ends_with("-cv.txt"));
    }
}
