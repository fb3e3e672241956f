//! Persistence Sink: writes successful outcomes as résumé + analysis rows.
//!
//! The résumé is always written first; the analysis references it. If the
//! résumé write fails no analysis is attempted, so there is never an analysis
//! pointing at a missing résumé.

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::resume::{NewAnalysis, NewResume};
use crate::screening::models::{PersistenceResult, ScoredResume, ScoringOutcome};
use crate::store::{ScreeningStore, StoreError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("resume: {0}")]
    Resume(#[source] StoreError),

    /// The résumé row was written and stays; only its analysis is missing.
    #[error("analysis: {source}")]
    Analysis {
        resume_id: Uuid,
        #[source]
        source: StoreError,
    },
}

pub async fn persist(store: &dyn ScreeningStore, job_id: Uuid, outcome: &ScoringOutcome) -> PersistenceResult {
    let scored = match outcome {
        ScoringOutcome::Success(scored) => scored,
        ScoringOutcome::Failure(f) => {
            return PersistenceResult::Skipped {
                path: f.path.clone(),
            }
        }
    };

    match write_records(store, job_id, scored).await {
        Ok((resume_id, analysis_id)) => PersistenceResult::Persisted {
            path: scored.path.clone(),
            resume_id,
            analysis_id,
        },
        Err(e) => {
            if let PersistError::Analysis { resume_id, .. } = &e {
                warn!(path = %scored.path, %resume_id, "Resume stored without analysis");
            }
            warn!(path = %scored.path, error = %e, "Failed to persist outcome");
            PersistenceResult::Failed {
                path: scored.path.clone(),
                reason: e.to_string(),
            }
        }
    }
}

async fn write_records(
    store: &dyn ScreeningStore,
    job_id: Uuid,
    scored: &ScoredResume,
) -> Result<(Uuid, Uuid), PersistError> {
    let resume_id = store
        .create_resume(NewResume {
            job_id,
            content: scored.content.clone(),
            file: scored.path.clone(),
            opinion: scored.opinion.clone(),
            competence: scored.criteria.competence.clone(),
            strategies: scored.criteria.strategies.clone(),
            qualifications: scored.criteria.qualifications.clone(),
        })
        .await
        .map_err(PersistError::Resume)?;

    let analysis_id = store
        .create_analysis(NewAnalysis {
            resume_id,
            job_id,
            summary: scored.summary.clone(),
            score: scored.overall_score,
        })
        .await
        .map_err(|source| PersistError::Analysis { resume_id, source })?;

    Ok((resume_id, analysis_id))
}

/// Persists every outcome in order. One failed write never stops the rest.
pub async fn persist_all(
    store: &dyn ScreeningStore,
    job_id: Uuid,
    outcomes: &[ScoringOutcome],
) -> Vec<PersistenceResult> {
    let mut results = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        results.push(persist(store, job_id, outcome).await);
    }

    let persisted = results
        .iter()
        .filter(|r| matches!(r, PersistenceResult::Persisted { .. }))
        .count();
    info!(%job_id, persisted, total = outcomes.len(), "Persisted batch outcomes");
    results
}
