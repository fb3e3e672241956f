//! Axum route handlers for the Jobs API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::models::job::{Job, NewJob};
use crate::state::AppState;

/// Trims every entry and drops blanks.
fn clean_facet(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn validate_new_job(req: NewJob) -> Result<NewJob, AppError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Job name must not be empty".to_string()));
    }
    let job = NewJob {
        name,
        competence: clean_facet(req.competence),
        strategies: clean_facet(req.strategies),
        qualifications: clean_facet(req.qualifications),
    };
    if job.competence.is_empty() && job.strategies.is_empty() && job.qualifications.is_empty() {
        return Err(AppError::Validation(
            "A job needs at least one competence, strategy or qualification".to_string(),
        ));
    }
    Ok(job)
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(req): Json<NewJob>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let job = state.store.create_job(validate_new_job(req)?).await?;
    tracing::info!(job = %job.name, id = %job.id, "Job created");
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs
pub async fn handle_list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>, AppError> {
    Ok(Json(state.store.list_jobs().await?))
}

/// GET /api/v1/jobs/:job_name
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_name): Path<String>,
) -> Result<Json<Job>, AppError> {
    state
        .store
        .get_job_by_name(&job_name)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job '{job_name}' not found")))
}
