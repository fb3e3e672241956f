//! Job, résumé and analysis persistence.

#[cfg(test)]
pub mod mock_store;
mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::job::{Job, NewJob};
use crate::models::resume::{AnalysisRow, CandidateRow, NewAnalysis, NewResume, ResumeRow};

pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job '{0}' already exists")]
    DuplicateJob(String),

    #[error("Store rejected write: {0}")]
    Rejected(String),
}

/// Rows removed by a job cleanup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletedCounts {
    pub resumes: u64,
    pub analyses: u64,
}

#[async_trait]
pub trait ScreeningStore: Send + Sync {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError>;

    async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>, StoreError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn create_resume(&self, resume: NewResume) -> Result<Uuid, StoreError>;

    /// The referenced résumé must already exist.
    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Uuid, StoreError>;

    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, StoreError>;

    async fn get_analysis_by_resume_id(&self, resume_id: Uuid) -> Result<Option<AnalysisRow>, StoreError>;

    async fn list_resumes_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResumeRow>, StoreError>;

    /// Analyses joined with their résumé, best score first.
    async fn list_candidates(&self, job_id: Uuid) -> Result<Vec<CandidateRow>, StoreError>;

    /// Removes every analysis and résumé of a job.
    async fn delete_all_by_job_id(&self, job_id: Uuid) -> Result<DeletedCounts, StoreError>;
}
