//! Scoring Task: turns one résumé into a `ScoringOutcome`.
//!
//! The task owns no shared state. Its only side effects are the LLM calls,
//! which go through the `ScreeningLlm` trait so backends can be swapped
//! (Anthropic in production, scripted doubles in tests).

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::job::{Criterion, Job};
use crate::models::resume::CriterionScore;
use crate::screening::models::{
    CriterionScores, LoadedResume, ScoredResume, ScoringFailure, ScoringOutcome,
};
use crate::screening::prompts::{
    format_list, CRITERIA_SCORE_PROMPT, OPINION_PROMPT, OPINION_SYSTEM, OVERALL_SCORE_PROMPT,
    SUMMARY_PROMPT, SUMMARY_SYSTEM,
};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 10.0;

/// The four LLM capabilities a scoring task needs.
#[async_trait]
pub trait ScreeningLlm: Send + Sync {
    async fn summarize(&self, content: &str) -> Result<String, LlmError>;

    async fn opine(&self, content: &str, job: &Job) -> Result<String, LlmError>;

    /// Overall fit in `[0, 10]`, always judged with the job context.
    async fn score(&self, content: &str, job: &Job) -> Result<f64, LlmError>;

    async fn score_against(
        &self,
        content: &str,
        criteria: &[String],
    ) -> Result<CriterionScore, LlmError>;
}

/// The LLM step a scoring failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStep {
    Summary,
    Opinion,
    OverallScore,
    CriterionScore(Criterion),
}

impl fmt::Display for ScoringStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringStep::Summary => f.write_str("summary"),
            ScoringStep::Opinion => f.write_str("opinion"),
            ScoringStep::OverallScore => f.write_str("overall score"),
            ScoringStep::CriterionScore(c) => write!(f, "{} score", c.as_str()),
        }
    }
}

#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct ScoringError {
    pub step: ScoringStep,
    #[source]
    pub source: LlmError,
}

trait StepContext<T> {
    fn step(self, step: ScoringStep) -> Result<T, ScoringError>;
}

impl<T> StepContext<T> for Result<T, LlmError> {
    fn step(self, step: ScoringStep) -> Result<T, ScoringError> {
        self.map_err(|source| ScoringError { step, source })
    }
}

/// Scores one résumé. Any LLM error becomes a failure outcome for this file
/// only; it never propagates to sibling tasks.
pub async fn score_resume(llm: &dyn ScreeningLlm, resume: &LoadedResume, job: &Job) -> ScoringOutcome {
    match run_scoring(llm, resume, job).await {
        Ok(scored) => {
            debug!(path = %resume.path, score = scored.overall_score, "Scored resume");
            ScoringOutcome::Success(scored)
        }
        Err(e) => {
            warn!(path = %resume.path, error = %e, "Scoring failed");
            ScoringOutcome::Failure(ScoringFailure {
                path: resume.path.clone(),
                reason: e.to_string(),
            })
        }
    }
}

async fn run_scoring(
    llm: &dyn ScreeningLlm,
    resume: &LoadedResume,
    job: &Job,
) -> Result<ScoredResume, ScoringError> {
    let content = resume.content.as_str();

    let summary = llm.summarize(content).await.step(ScoringStep::Summary)?;
    let opinion = llm.opine(content, job).await.step(ScoringStep::Opinion)?;
    let overall = llm
        .score(content, job)
        .await
        .and_then(|s| normalize_score(s, &resume.path))
        .step(ScoringStep::OverallScore)?;

    // The three facets are independent, so they are asked concurrently.
    let (competence, strategies, qualifications) = tokio::try_join!(
        criterion_score(llm, resume, job, Criterion::Competence),
        criterion_score(llm, resume, job, Criterion::Strategies),
        criterion_score(llm, resume, job, Criterion::Qualifications),
    )?;

    Ok(ScoredResume {
        path: resume.path.clone(),
        content: resume.content.clone(),
        summary,
        opinion,
        overall_score: overall,
        criteria: CriterionScores {
            competence,
            strategies,
            qualifications,
        },
    })
}

async fn criterion_score(
    llm: &dyn ScreeningLlm,
    resume: &LoadedResume,
    job: &Job,
    criterion: Criterion,
) -> Result<CriterionScore, ScoringError> {
    let step = ScoringStep::CriterionScore(criterion);
    let raw = llm
        .score_against(&resume.content, job.criteria(criterion))
        .await
        .step(step)?;
    let score = normalize_score(raw.score, &resume.path).step(step)?;
    Ok(CriterionScore {
        score,
        explanation: raw.explanation,
    })
}

/// Rejects non-finite scores and clamps the rest into `[0, 10]`.
pub fn normalize_score(raw: f64, path: &str) -> Result<f64, LlmError> {
    if !raw.is_finite() {
        return Err(LlmError::InvalidScore);
    }
    if !(MIN_SCORE..=MAX_SCORE).contains(&raw) {
        warn!(path = %path, raw, "Score out of range, clamping");
    }
    Ok(raw.clamp(MIN_SCORE, MAX_SCORE))
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic-backed implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f64,
}

#[derive(Debug, Deserialize)]
struct CriterionReply {
    score: f64,
    #[serde(default)]
    explanation: String,
}

fn job_prompt(template: &str, content: &str, job: &Job) -> String {
    template
        .replace("{job_name}", &job.name)
        .replace("{competence}", &format_list(&job.competence))
        .replace("{strategies}", &format_list(&job.strategies))
        .replace("{qualifications}", &format_list(&job.qualifications))
        .replace("{resume}", content)
}

#[async_trait]
impl ScreeningLlm for LlmClient {
    async fn summarize(&self, content: &str) -> Result<String, LlmError> {
        let prompt = SUMMARY_PROMPT.replace("{resume}", content);
        self.call_text(&prompt, SUMMARY_SYSTEM).await
    }

    async fn opine(&self, content: &str, job: &Job) -> Result<String, LlmError> {
        let prompt = job_prompt(OPINION_PROMPT, content, job);
        self.call_text(&prompt, OPINION_SYSTEM).await
    }

    async fn score(&self, content: &str, job: &Job) -> Result<f64, LlmError> {
        let prompt = job_prompt(OVERALL_SCORE_PROMPT, content, job);
        let reply: ScoreReply = self.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
        Ok(reply.score)
    }

    async fn score_against(
        &self,
        content: &str,
        criteria: &[String],
    ) -> Result<CriterionScore, LlmError> {
        let prompt = CRITERIA_SCORE_PROMPT
            .replace("{criteria}", &format_list(criteria))
            .replace("{resume}", content);
        let reply: CriterionReply = self.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
        Ok(CriterionScore {
            score: reply.score,
            explanation: reply.explanation,
        })
    }
}
