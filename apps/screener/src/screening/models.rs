use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::resume::CriterionScore;
use crate::storage::UploadedFile;

const FILE_NAMESPACE: Uuid = Uuid::from_u128(0x3f0c_9a4e_51d2_4b7a_9c1e_7d2b_8e64_a0f1);
const BATCH_NAMESPACE: Uuid = Uuid::from_u128(0x8d27_c3b5_0e49_4f6a_b2d8_16f5_c97e_3a52);

/// Identity of one upload batch within a session.
///
/// Derived from the session, the job and the content of every file, ignoring
/// upload order, so re-submitting the same files maps to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchKey(Uuid);

impl BatchKey {
    pub fn derive(session: &str, job_id: Uuid, files: &[UploadedFile]) -> Self {
        let mut digests: Vec<Uuid> = files
            .iter()
            .map(|f| Uuid::new_v5(&FILE_NAMESPACE, &f.data))
            .collect();
        digests.sort();

        let mut name = Vec::with_capacity(session.len() + 16 * (digests.len() + 2));
        name.extend_from_slice(session.as_bytes());
        name.push(0);
        name.extend_from_slice(job_id.as_bytes());
        for digest in &digests {
            name.extend_from_slice(digest.as_bytes());
        }
        BatchKey(Uuid::new_v5(&BATCH_NAMESPACE, &name))
    }
}

impl From<Uuid> for BatchKey {
    fn from(id: Uuid) -> Self {
        BatchKey(id)
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A résumé that was saved and decoded, ready for scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedResume {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub competence: CriterionScore,
    pub strategies: CriterionScore,
    pub qualifications: CriterionScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResume {
    pub path: String,
    /// Kept for persistence only; not echoed back to clients.
    #[serde(skip)]
    pub content: String,
    pub summary: String,
    pub opinion: String,
    /// 0–10.
    pub overall_score: f64,
    pub criteria: CriterionScores,
}

/// A 0–10 score as a 0–100 progress value.
pub fn progress_value(score: f64) -> u8 {
    (score * 10.0).round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringFailure {
    pub path: String,
    pub reason: String,
}

/// Result of scoring one file. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoringOutcome {
    Success(ScoredResume),
    Failure(ScoringFailure),
}

impl ScoringOutcome {
    pub fn path(&self) -> &str {
        match self {
            ScoringOutcome::Success(s) => &s.path,
            ScoringOutcome::Failure(f) => &f.path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScoringOutcome::Success(_))
    }
}

/// Lifecycle of a batch. `Completed`, `TimedOut` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Aborted,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchState::Completed | BatchState::TimedOut | BatchState::Aborted
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchState::Idle => "idle",
            BatchState::Running => "running",
            BatchState::Completed => "completed",
            BatchState::TimedOut => "timed_out",
            BatchState::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// What the scheduler hands back once a batch reaches a terminal state.
#[derive(Debug, Clone)]
pub struct ScheduledBatch {
    pub state: BatchState,
    pub total: usize,
    /// Arrival order, not submission order.
    pub outcomes: Vec<ScoringOutcome>,
    pub fault: Option<String>,
}

impl ScheduledBatch {
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }
}

/// Per-outcome result of writing records to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PersistenceResult {
    Persisted {
        path: String,
        resume_id: Uuid,
        analysis_id: Uuid,
    },
    /// Failed outcomes are reported but never written.
    Skipped { path: String },
    Failed { path: String, reason: String },
}

/// How the presentation layer should describe a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchVerdict {
    NoFilesProcessed,
    AllSucceeded,
    PartialFailure,
    TimedOut,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_key: BatchKey,
    pub job_id: Uuid,
    pub job_name: String,
    pub state: BatchState,
    /// Files received in the upload.
    pub submitted: usize,
    /// Files that could not be saved or decoded.
    pub load_failures: usize,
    /// Scoring tasks dispatched.
    pub total: usize,
    pub completed: usize,
    pub outcomes: Vec<ScoringOutcome>,
    pub persistence: Vec<PersistenceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.completed - self.succeeded()
    }

    pub fn verdict(&self) -> BatchVerdict {
        match self.state {
            BatchState::Aborted => return BatchVerdict::Aborted,
            BatchState::TimedOut => return BatchVerdict::TimedOut,
            _ => {}
        }
        if self.outcomes.is_empty() {
            return BatchVerdict::NoFilesProcessed;
        }
        let persistence_failed = self
            .persistence
            .iter()
            .any(|p| matches!(p, PersistenceResult::Failed { .. }));
        if self.failed() > 0 || self.load_failures > 0 || persistence_failed {
            BatchVerdict::PartialFailure
        } else {
            BatchVerdict::AllSucceeded
        }
    }
}
