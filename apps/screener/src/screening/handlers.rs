use axum::{
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::Job;
use crate::models::resume::{AnalysisRow, CandidateRow, ResumeRow};
use crate::screening::models::{progress_value, BatchKey, BatchReport, BatchVerdict};
use crate::screening::pipeline::{CleanupReport, ScreeningRun};
use crate::screening::progress::ProgressSnapshot;
use crate::state::AppState;
use crate::storage::UploadedFile;

pub const SESSION_HEADER: &str = "x-session-id";
const ANONYMOUS_SESSION: &str = "anonymous";

fn session_id(headers: &HeaderMap) -> &str {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(ANONYMOUS_SESSION)
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Processed,
    AlreadyProcessed,
    InProgress,
}

#[derive(Serialize)]
pub struct ScreeningResponse {
    pub batch_key: BatchKey,
    pub status: ScreeningStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<BatchVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

impl ScreeningResponse {
    fn finished(status: ScreeningStatus, report: BatchReport) -> Self {
        Self {
            batch_key: report.batch_key,
            status,
            verdict: Some(report.verdict()),
            report: Some(report),
        }
    }
}

async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        // Plain form fields carry no file.
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read '{file_name}': {e}")))?;
        uploads.push(UploadedFile::new(file_name, data));
    }
    Ok(uploads)
}

/// POST /api/v1/jobs/:job_name/screenings
pub async fn handle_screen(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ScreeningResponse>), AppError> {
    let uploads = read_uploads(multipart).await?;
    let session = session_id(&headers);

    let response = match state.pipeline.run_batch(session, &job_name, uploads).await? {
        ScreeningRun::Processed(report) => (
            StatusCode::OK,
            ScreeningResponse::finished(ScreeningStatus::Processed, report),
        ),
        ScreeningRun::AlreadyProcessed(report) => (
            StatusCode::OK,
            ScreeningResponse::finished(ScreeningStatus::AlreadyProcessed, report),
        ),
        ScreeningRun::InProgress(batch_key) => (
            StatusCode::ACCEPTED,
            ScreeningResponse {
                batch_key,
                status: ScreeningStatus::InProgress,
                verdict: None,
                report: None,
            },
        ),
    };
    Ok((response.0, Json(response.1)))
}

/// GET /api/v1/screenings/:batch_key/progress
pub async fn handle_progress(
    State(state): State<AppState>,
    Path(batch_key): Path<Uuid>,
) -> Result<Json<ProgressSnapshot>, AppError> {
    let batch_key = BatchKey::from(batch_key);
    state
        .progress
        .snapshot(&batch_key)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No progress for batch {batch_key}")))
}

/// DELETE /api/v1/screenings/:batch_key
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(batch_key): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let batch_key = BatchKey::from(batch_key);
    state.pipeline.reset(&batch_key).await?;
    state.progress.forget(&batch_key);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct CandidateView {
    #[serde(flatten)]
    pub row: CandidateRow,
    /// Score rendered as 0–100.
    pub progress: u8,
}

#[derive(Serialize)]
pub struct CandidatesResponse {
    pub job: Job,
    pub candidates: Vec<CandidateView>,
}

/// GET /api/v1/jobs/:job_name/candidates
pub async fn handle_list_candidates(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<Json<CandidatesResponse>, AppError> {
    let (job, rows) = state.pipeline.candidates(&job_name).await?;
    let candidates = rows
        .into_iter()
        .map(|row| CandidateView {
            progress: progress_value(row.score),
            row,
        })
        .collect();
    Ok(Json(CandidatesResponse { job, candidates }))
}

/// DELETE /api/v1/jobs/:job_name/candidates
pub async fn handle_clean_candidates(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<Json<CleanupReport>, AppError> {
    Ok(Json(state.pipeline.clean_job(&job_name).await?))
}

#[derive(Serialize)]
pub struct ResumeDetailResponse {
    pub resume: ResumeRow,
    pub analysis: Option<AnalysisRow>,
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeDetailResponse>, AppError> {
    let (resume, analysis) = state
        .pipeline
        .resume(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))?;
    Ok(Json(ResumeDetailResponse { resume, analysis }))
}
