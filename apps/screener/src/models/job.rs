use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A job opening résumés are screened against.
/// Read-only for the duration of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub competence: Vec<String>,
    pub strategies: Vec<String>,
    pub qualifications: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub competence: Vec<String>,
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

/// One of the three facets a résumé is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Competence,
    Strategies,
    Qualifications,
}

impl Criterion {
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Competence => "competence",
            Criterion::Strategies => "strategies",
            Criterion::Qualifications => "qualifications",
        }
    }
}

impl Job {
    pub fn criteria(&self, criterion: Criterion) -> &[String] {
        match criterion {
            Criterion::Competence => &self.competence,
            Criterion::Strategies => &self.strategies,
            Criterion::Qualifications => &self.qualifications,
        }
    }
}
