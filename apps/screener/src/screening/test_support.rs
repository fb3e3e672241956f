//! Test doubles shared by the screening tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::llm_client::LlmError;
use crate::models::job::Job;
use crate::models::resume::CriterionScore;
use crate::screening::progress::{ProgressEvent, ProgressReporter};
use crate::screening::scoring::ScreeningLlm;

type Hook = Box<dyn FnOnce() + Send>;

pub fn sample_job() -> Job {
    Job {
        id: Uuid::new_v4(),
        name: "IoT Engineer".to_string(),
        competence: vec!["IoT".to_string()],
        strategies: vec!["Python".to_string()],
        qualifications: vec!["5yr exp".to_string()],
        created_at: Utc::now(),
    }
}

/// LLM double keyed by résumé content.
///
/// Summaries and opinions echo the content, scores come from `with_score`
/// (default 5.0), and `summarize` sleeps for the configured delay so tests
/// can observe concurrency and deadlines.
#[derive(Default)]
pub struct ScriptedLlm {
    scores: HashMap<String, f64>,
    failing_opinions: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    hooks: Mutex<HashMap<String, Hook>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, content: &str, score: f64) -> Self {
        self.scores.insert(content.to_string(), score);
        self
    }

    pub fn failing_opinion_for(mut self, content: &str) -> Self {
        self.failing_opinions.insert(content.to_string());
        self
    }

    pub fn with_delay(mut self, content: &str, delay: Duration) -> Self {
        self.delays.insert(content.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Runs `hook` once, when `content` is summarized.
    pub fn with_hook(self, content: &str, hook: impl FnOnce() + Send + 'static) -> Self {
        self.hooks
            .lock()
            .unwrap()
            .insert(content.to_string(), Box::new(hook));
        self
    }

    /// Total LLM calls made, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of résumés being summarized at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScreeningLlm for ScriptedLlm {
    async fn summarize(&self, content: &str) -> Result<String, LlmError> {
        self.count();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .get(content)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let hook = self.hooks.lock().unwrap().remove(content);
        if let Some(hook) = hook {
            hook();
        }
        Ok(format!("summary of {content}"))
    }

    async fn opine(&self, content: &str, job: &Job) -> Result<String, LlmError> {
        self.count();
        if self.failing_opinions.contains(content) {
            return Err(LlmError::Api {
                status: 500,
                message: format!("opinion backend exploded on {content}"),
            });
        }
        Ok(format!("opinion on {content} for {}", job.name))
    }

    async fn score(&self, content: &str, _job: &Job) -> Result<f64, LlmError> {
        self.count();
        Ok(self.scores.get(content).copied().unwrap_or(5.0))
    }

    async fn score_against(
        &self,
        content: &str,
        criteria: &[String],
    ) -> Result<CriterionScore, LlmError> {
        self.count();
        Ok(CriterionScore {
            score: self.scores.get(content).copied().unwrap_or(5.0),
            explanation: format!("matches {}", criteria.join(", ")),
        })
    }
}

/// Progress reporter that keeps every event.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
