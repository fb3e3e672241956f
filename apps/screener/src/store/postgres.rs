use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{DeletedCounts, ScreeningStore, StoreError};
use crate::models::job::{Job, NewJob};
use crate::models::resume::{AnalysisRow, CandidateRow, NewAnalysis, NewResume, ResumeRow};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}

#[async_trait]
impl ScreeningStore for PgStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, name, competence, strategies, qualifications)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&job.name)
        .bind(&job.competence)
        .bind(&job.strategies)
        .bind(&job.qualifications)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateJob(job.name.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        info!("Created job {} ({})", row.name, row.id);
        Ok(row)
    }

    async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>, StoreError> {
        Ok(
            sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(
            sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY name ASC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_resume(&self, resume: NewResume) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO resumes
                (id, job_id, content, file, opinion, competence, strategies, qualifications)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(resume.job_id)
        .bind(&resume.content)
        .bind(&resume.file)
        .bind(&resume.opinion)
        .bind(Json(&resume.competence))
        .bind(Json(&resume.strategies))
        .bind(Json(&resume.qualifications))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Uuid, StoreError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO analyses (id, resume_id, job_id, summary, score)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(analysis.resume_id)
        .bind(analysis.job_id)
        .bind(&analysis.summary)
        .bind(analysis.score)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_analysis_by_resume_id(&self, resume_id: Uuid) -> Result<Option<AnalysisRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, AnalysisRow>("SELECT * FROM analyses WHERE resume_id = $1")
                .bind(resume_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_resumes_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResumeRow>, StoreError> {
        Ok(sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE job_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_candidates(&self, job_id: Uuid) -> Result<Vec<CandidateRow>, StoreError> {
        Ok(sqlx::query_as::<_, CandidateRow>(
            r#"
            SELECT a.id AS analysis_id, a.resume_id, r.file, a.summary, r.opinion,
                   a.score, a.created_at
            FROM analyses a
            JOIN resumes r ON r.id = a.resume_id
            WHERE a.job_id = $1
            ORDER BY a.score DESC, a.created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_all_by_job_id(&self, job_id: Uuid) -> Result<DeletedCounts, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Analyses reference résumés, so they go first.
        let analyses = sqlx::query("DELETE FROM analyses WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let resumes = sqlx::query("DELETE FROM resumes WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!("Deleted {resumes} resumes and {analyses} analyses for job {job_id}");
        Ok(DeletedCounts { resumes, analyses })
    }
}
