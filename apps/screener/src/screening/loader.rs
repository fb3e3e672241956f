//! Content Loader: saves uploads and decodes them into text.
//!
//! A file that cannot be saved or decoded is left out of the result and
//! counted; it never fails the whole load.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::screening::models::LoadedResume;
use crate::storage::{FileStore, FileStoreError, UploadedFile};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("storage: {0}")]
    Storage(#[from] FileStoreError),

    #[error("could not decode PDF: {0}")]
    Pdf(String),

    #[error("file is not valid UTF-8 text")]
    NotText,

    #[error("no text content")]
    Empty,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedResume>,
    /// Files excluded because they could not be saved or decoded.
    pub failed: usize,
}

pub struct ContentLoader {
    files: Arc<dyn FileStore>,
}

impl ContentLoader {
    pub fn new(files: Arc<dyn FileStore>) -> Self {
        Self { files }
    }

    pub async fn load(&self, destination: &str, uploads: &[UploadedFile]) -> LoadReport {
        let mut report = LoadReport::default();

        let mut saved = Vec::with_capacity(uploads.len());
        for (upload, result) in uploads.iter().zip(self.files.save_all(destination, uploads).await) {
            match result {
                Ok(path) => saved.push((upload.file_name.as_str(), path)),
                Err(e) => report.exclude(&upload.file_name, &LoadError::from(e)),
            }
        }

        let paths: Vec<String> = saved.iter().map(|(_, path)| path.clone()).collect();
        let contents = self.files.read_all(&paths).await;

        for ((file_name, path), data) in saved.into_iter().zip(contents) {
            let decoded = match data {
                Ok(data) => decode(file_name, data).await,
                Err(e) => Err(e.into()),
            };
            match decoded {
                Ok(content) => report.loaded.push(LoadedResume { path, content }),
                Err(e) => {
                    report.exclude(file_name, &e);
                    // Undecodable files are not kept around.
                    if let Err(remove_err) = self.files.remove(&path).await {
                        warn!(path = %path, error = %remove_err, "Failed to remove excluded upload");
                    }
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed,
            "Loaded uploads"
        );
        report
    }
}

impl LoadReport {
    fn exclude(&mut self, file_name: &str, error: &LoadError) {
        warn!(file = %file_name, error = %error, "Excluding upload from batch");
        self.failed += 1;
    }
}

fn is_pdf(file_name: &str, data: &[u8]) -> bool {
    data.starts_with(b"%PDF") || file_name.to_ascii_lowercase().ends_with(".pdf")
}

/// Decodes PDF uploads with `pdf-extract` and everything else as UTF-8 text.
pub async fn decode(file_name: &str, data: Bytes) -> Result<String, LoadError> {
    let text = if is_pdf(file_name, &data) {
        // pdf-extract is CPU-bound and may panic on malformed input.
        tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&data))
            .await
            .map_err(|e| LoadError::Pdf(e.to_string()))?
            .map_err(|e| LoadError::Pdf(format!("{e:?}")))?
    } else {
        String::from_utf8(data.to_vec()).map_err(|_| LoadError::NotText)?
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(text.to_string())
}
