use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A `(score, explanation)` pair for one job facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    pub explanation: String,
}

/// Persisted résumé. Written once per successful scoring outcome, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub content: String,
    pub file: String,
    pub opinion: String,
    pub competence: Json<CriterionScore>,
    pub strategies: Json<CriterionScore>,
    pub qualifications: Json<CriterionScore>,
    pub created_at: DateTime<Utc>,
}

/// Persisted analysis. One-to-one with a résumé row and always created after it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub summary: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResume {
    pub job_id: Uuid,
    pub content: String,
    pub file: String,
    pub opinion: String,
    pub competence: CriterionScore,
    pub strategies: CriterionScore,
    pub qualifications: CriterionScore,
}

#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub resume_id: Uuid,
    pub job_id: Uuid,
    pub summary: String,
    pub score: f64,
}

/// One row of the review grid: an analysis joined with its résumé.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRow {
    pub analysis_id: Uuid,
    pub resume_id: Uuid,
    pub file: String,
    pub summary: String,
    pub opinion: String,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}
