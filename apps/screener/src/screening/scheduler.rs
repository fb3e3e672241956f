//! Batch Scheduler: fans a batch of résumés out to concurrent scoring tasks.
//!
//! State machine: `Idle → Running → {Completed, TimedOut, Aborted}`.
//!
//! - One task per résumé, bounded by a worker pool (a semaphore shared by
//!   every batch in the process, so parallel batches share one LLM budget).
//! - One wall-clock deadline for the whole batch. When it fires, outstanding
//!   tasks are aborted and whatever arrived so far is returned.
//! - Outcomes are collected in arrival order by this loop alone, which is the
//!   only writer of the result list and the completed count.
//! - A fault in the coordination itself (pool closed, task cancelled behind
//!   our back) aborts the batch. Tasks that never got a worker are dropped;
//!   tasks already holding one are still awaited until the deadline, and
//!   every finished outcome is kept.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::models::job::Job;
use crate::screening::models::{
    BatchKey, BatchState, LoadedResume, ScheduledBatch, ScoringFailure, ScoringOutcome,
};
use crate::screening::progress::{ProgressEvent, ProgressReporter};
use crate::screening::scoring::{score_resume, ScreeningLlm};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum scoring tasks running at once across all batches. Must be > 0.
    pub max_workers: usize,
    pub deadline: Duration,
}

#[derive(Debug, Error)]
pub enum SchedulerFault {
    #[error("worker pool is closed")]
    PoolClosed,

    #[error("scoring task for '{0}' was cancelled")]
    TaskCancelled(String),
}

pub struct BatchScheduler {
    llm: Arc<dyn ScreeningLlm>,
    pool: Arc<Semaphore>,
    deadline: Duration,
}

impl BatchScheduler {
    /// # Panics
    /// Panics if `config.max_workers` is 0.
    pub fn new(llm: Arc<dyn ScreeningLlm>, config: SchedulerConfig) -> Self {
        assert!(config.max_workers > 0, "max_workers must be > 0");
        Self {
            llm,
            pool: Arc::new(Semaphore::new(config.max_workers)),
            deadline: config.deadline,
        }
    }

    /// Closes the worker pool. Tasks still waiting for a worker are dropped
    /// and their batch ends `Aborted`; tasks already running finish normally
    /// and their outcomes are kept.
    pub fn shutdown(&self) {
        info!("Closing scoring worker pool");
        self.pool.close();
    }

    /// Runs one batch to a terminal state with the configured deadline.
    pub async fn run(
        &self,
        batch_key: BatchKey,
        job: Arc<Job>,
        resumes: Vec<LoadedResume>,
        progress: &dyn ProgressReporter,
    ) -> ScheduledBatch {
        self.run_with_deadline(batch_key, job, resumes, progress, self.deadline)
            .await
    }

    pub async fn run_with_deadline(
        &self,
        batch_key: BatchKey,
        job: Arc<Job>,
        resumes: Vec<LoadedResume>,
        progress: &dyn ProgressReporter,
        deadline: Duration,
    ) -> ScheduledBatch {
        let total = resumes.len();
        let deadline_at = Instant::now() + deadline;
        let mut state = BatchState::Idle;

        info!(
            batch_key = %batch_key,
            job = %job.name,
            total,
            deadline_secs = deadline.as_secs_f64(),
            "Batch started"
        );
        progress.report(ProgressEvent::Started { batch_key, total });

        let mut tasks = JoinSet::new();
        let mut paths = HashMap::with_capacity(total);

        for resume in resumes {
            let llm = Arc::clone(&self.llm);
            let pool = Arc::clone(&self.pool);
            let job = Arc::clone(&job);
            let path = resume.path.clone();

            let handle = tasks.spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|_| SchedulerFault::PoolClosed)?;
                Ok::<_, SchedulerFault>(score_resume(llm.as_ref(), &resume, &job).await)
            });
            paths.insert(handle.id(), path);
        }

        debug!(batch_key = %batch_key, "{state} -> running");
        state = BatchState::Running;

        let mut outcomes: Vec<ScoringOutcome> = Vec::with_capacity(total);
        let mut fault: Option<SchedulerFault> = None;

        loop {
            if tasks.is_empty() {
                break;
            }
            if Instant::now() >= deadline_at {
                state = timed_out_or_aborted(&fault);
                break;
            }

            let joined = match tokio::time::timeout_at(deadline_at, tasks.join_next_with_id()).await
            {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    state = timed_out_or_aborted(&fault);
                    break;
                }
            };

            let outcome = match joined {
                Ok((id, Ok(outcome))) => {
                    paths.remove(&id);
                    outcome
                }
                Ok((id, Err(f))) => {
                    let path = paths.remove(&id).unwrap_or_default();
                    warn!(batch_key = %batch_key, path = %path, fault = %f, "Scoring task dropped");
                    fault.get_or_insert(f);
                    continue;
                }
                Err(join_error) => {
                    let path = paths.remove(&join_error.id()).unwrap_or_default();
                    if join_error.is_panic() {
                        // A panicking task is a per-file failure, not a scheduler fault.
                        error!(path = %path, "Scoring task panicked");
                        ScoringOutcome::Failure(ScoringFailure {
                            path,
                            reason: "scoring task panicked".to_string(),
                        })
                    } else {
                        warn!(batch_key = %batch_key, path = %path, "Scoring task cancelled");
                        fault.get_or_insert(SchedulerFault::TaskCancelled(path));
                        continue;
                    }
                }
            };

            let succeeded = outcome.is_success();
            let path = outcome.path().to_string();
            outcomes.push(outcome);
            progress.report(ProgressEvent::FileCompleted {
                batch_key,
                completed: outcomes.len(),
                total,
                path,
                succeeded,
            });
        }

        if state == BatchState::Running {
            state = if fault.is_some() {
                BatchState::Aborted
            } else {
                BatchState::Completed
            };
        }
        debug_assert!(state.is_terminal());

        // Best-effort cancellation; anything still running is abandoned and
        // its result, if it ever arrives, goes nowhere.
        let abandoned = tasks.len();
        tasks.abort_all();

        let completed = outcomes.len();
        match state {
            BatchState::TimedOut => warn!(
                batch_key = %batch_key,
                abandoned,
                "Batch timed out: {completed}/{total} completed"
            ),
            BatchState::Aborted => error!(
                batch_key = %batch_key,
                abandoned,
                fault = ?fault,
                "Batch aborted: {completed}/{total} completed"
            ),
            _ => info!(batch_key = %batch_key, "Batch completed: {completed}/{total}"),
        }
        progress.report(ProgressEvent::Finished {
            batch_key,
            state,
            completed,
            total,
        });

        ScheduledBatch {
            state,
            total,
            outcomes,
            fault: fault.map(|f| f.to_string()),
        }
    }
}

fn timed_out_or_aborted(fault: &Option<SchedulerFault>) -> BatchState {
    if fault.is_some() {
        BatchState::Aborted
    } else {
        BatchState::TimedOut
    }
}
