//! End-to-end screening of one upload batch.
//!
//! uploads → guard check → Content Loader → Batch Scheduler → Persistence Sink
//!
//! The guard is consulted before anything touches storage or the LLM, so a
//! repeated submission of the same files costs one lookup. Once claimed, the
//! batch runs on its own task: a caller that goes away mid-batch does not
//! leave the claim behind, the run still finishes and is marked done.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::job::Job;
use crate::models::resume::{AnalysisRow, CandidateRow, ResumeRow};
use crate::screening::guard::{GuardError, RunGuard};
use crate::screening::loader::ContentLoader;
use crate::screening::models::{BatchKey, BatchReport};
use crate::screening::persistence::persist_all;
use crate::screening::progress::ProgressReporter;
use crate::screening::scheduler::BatchScheduler;
use crate::storage::{FileStore, FileStoreError, UploadedFile, RESUME_DESTINATION};
use crate::store::{DeletedCounts, ScreeningStore, StoreError};

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("Job '{0}' not found")]
    UnknownJob(String),

    #[error("No files were uploaded")]
    EmptyUpload,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Files(#[from] FileStoreError),

    #[error("Batch {0} was interrupted")]
    Interrupted(String),
}

/// What a screening submission resolved to.
#[derive(Debug)]
pub enum ScreeningRun {
    /// The batch ran now.
    Processed(BatchReport),
    /// The same batch already ran in this session; nothing was redone.
    AlreadyProcessed(BatchReport),
    /// The same batch is running right now.
    InProgress(BatchKey),
}

/// Result of wiping a job's screening data.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanupReport {
    pub deleted: DeletedCounts,
    pub files_removed: usize,
    /// Files referenced by deleted rows that were already gone.
    pub files_missing: usize,
    /// Files that could not be removed; they are logged and left behind.
    pub files_failed: usize,
}

pub struct ScreeningPipeline {
    store: Arc<dyn ScreeningStore>,
    files: Arc<dyn FileStore>,
    loader: ContentLoader,
    guard: Arc<dyn RunGuard>,
    scheduler: Arc<BatchScheduler>,
    progress: Arc<dyn ProgressReporter>,
}

impl ScreeningPipeline {
    pub fn new(
        store: Arc<dyn ScreeningStore>,
        files: Arc<dyn FileStore>,
        guard: Arc<dyn RunGuard>,
        scheduler: Arc<BatchScheduler>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            store,
            loader: ContentLoader::new(Arc::clone(&files)),
            files,
            guard,
            scheduler,
            progress,
        }
    }

    async fn job(&self, job_name: &str) -> Result<Job, ScreeningError> {
        self.store
            .get_job_by_name(job_name)
            .await?
            .ok_or_else(|| ScreeningError::UnknownJob(job_name.to_string()))
    }

    /// Screens `uploads` against the job named `job_name`.
    pub async fn run_batch(
        self: &Arc<Self>,
        session: &str,
        job_name: &str,
        uploads: Vec<UploadedFile>,
    ) -> Result<ScreeningRun, ScreeningError> {
        if uploads.is_empty() {
            return Err(ScreeningError::EmptyUpload);
        }
        let job = self.job(job_name).await?;
        let batch_key = BatchKey::derive(session, job.id, &uploads);

        if !self.guard.should_run(&batch_key).await? {
            let prior = self.guard.state(&batch_key).await?;
            return Ok(match prior.and_then(|s| s.report) {
                Some(report) => {
                    info!(batch_key = %batch_key, "Batch already processed, returning prior results");
                    ScreeningRun::AlreadyProcessed(report)
                }
                None => {
                    info!(batch_key = %batch_key, "Batch already running");
                    ScreeningRun::InProgress(batch_key)
                }
            });
        }

        let pipeline = Arc::clone(self);
        let run = tokio::spawn(async move { pipeline.finish(batch_key, job, uploads).await });

        match run.await {
            Ok(result) => result.map(ScreeningRun::Processed),
            Err(join_error) => {
                error!(batch_key = %batch_key, error = %join_error, "Batch task failed");
                self.guard.reset(&batch_key).await?;
                Err(ScreeningError::Interrupted(batch_key.to_string()))
            }
        }
    }

    /// Runs a claimed batch and resolves its claim: done, or released when
    /// nothing could be loaded.
    async fn finish(
        &self,
        batch_key: BatchKey,
        job: Job,
        uploads: Vec<UploadedFile>,
    ) -> Result<BatchReport, ScreeningError> {
        let report = self.execute(batch_key, job, &uploads).await;

        if report.total == 0 {
            // Nothing was loadable, so nothing ran; let the user retry.
            self.guard.reset(&batch_key).await?;
            return Ok(report);
        }

        // The results are already persisted; a guard write failure only means
        // the next identical submission waits for the claim to expire.
        if let Err(e) = self.guard.mark_done(&batch_key, &report).await {
            error!(batch_key = %batch_key, error = %e, "Failed to mark batch done");
        }
        Ok(report)
    }

    async fn execute(&self, batch_key: BatchKey, job: Job, uploads: &[UploadedFile]) -> BatchReport {
        let started = Instant::now();
        let load = self.loader.load(RESUME_DESTINATION, uploads).await;

        let job = Arc::new(job);
        let scheduled = self
            .scheduler
            .run(batch_key, Arc::clone(&job), load.loaded, self.progress.as_ref())
            .await;

        let persistence = persist_all(self.store.as_ref(), job.id, &scheduled.outcomes).await;

        let report = BatchReport {
            batch_key,
            job_id: job.id,
            job_name: job.name.clone(),
            state: scheduled.state,
            submitted: uploads.len(),
            load_failures: load.failed,
            total: scheduled.total,
            completed: scheduled.completed(),
            outcomes: scheduled.outcomes,
            persistence,
            fault: scheduled.fault,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            batch_key = %batch_key,
            job = %report.job_name,
            state = %report.state,
            verdict = ?report.verdict(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Screening finished"
        );
        report
    }

    /// Forgets a batch so the same files can be screened again.
    pub async fn reset(&self, batch_key: &BatchKey) -> Result<(), ScreeningError> {
        self.guard.reset(batch_key).await?;
        info!(batch_key = %batch_key, "Batch reset");
        Ok(())
    }

    pub async fn candidates(&self, job_name: &str) -> Result<(Job, Vec<CandidateRow>), ScreeningError> {
        let job = self.job(job_name).await?;
        let rows = self.store.list_candidates(job.id).await?;
        Ok((job, rows))
    }

    /// A stored résumé and its analysis, if the résumé exists.
    pub async fn resume(&self, id: Uuid) -> Result<Option<(ResumeRow, Option<AnalysisRow>)>, ScreeningError> {
        let Some(resume) = self.store.get_resume(id).await? else {
            return Ok(None);
        };
        let analysis = self.store.get_analysis_by_resume_id(id).await?;
        Ok(Some((resume, analysis)))
    }

    /// Deletes every résumé and analysis of a job along with the stored files.
    pub async fn clean_job(&self, job_name: &str) -> Result<CleanupReport, ScreeningError> {
        let job = self.job(job_name).await?;
        let resumes = self.store.list_resumes_by_job_id(job.id).await?;
        let deleted = self.store.delete_all_by_job_id(job.id).await?;

        let mut report = CleanupReport {
            deleted,
            ..CleanupReport::default()
        };
        for resume in &resumes {
            match self.files.remove(&resume.file).await {
                Ok(()) => report.files_removed += 1,
                Err(FileStoreError::NotFound(_)) => report.files_missing += 1,
                Err(e) => {
                    warn!(path = %resume.file, error = %e, "Failed to remove stored resume");
                    report.files_failed += 1;
                }
            }
        }

        info!(
            job = %job.name,
            resumes = report.deleted.resumes,
            analyses = report.deleted.analyses,
            files_removed = report.files_removed,
            files_failed = report.files_failed,
            "Cleaned job analysis"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screening::guard::MemoryRunGuard;
    use crate::screening::models::{BatchState, BatchVerdict, ScoringOutcome};
    use crate::screening::scheduler::SchedulerConfig;
    use crate::screening::test_support::{RecordingProgress, ScriptedLlm};
    use crate::storage::LocalFileStore;
    use crate::store::mock_store::MockStore;
    use std::time::Duration;
    use tempfile::TempDir;

    const GUARD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    struct Harness {
        pipeline: Arc<ScreeningPipeline>,
        store: Arc<MockStore>,
        files: Arc<LocalFileStore>,
        guard: Arc<MemoryRunGuard>,
        llm: Arc<ScriptedLlm>,
        dir: TempDir,
    }

    async fn harness(llm: ScriptedLlm) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MockStore::new());
        store
            .seed_job("IoT Engineer", &["IoT"], &["Python"], &["5yr exp"])
            .await;
        let files = Arc::new(LocalFileStore::new(dir.path()));
        let guard = Arc::new(MemoryRunGuard::new(GUARD_TTL));
        let llm = Arc::new(llm);
        let scheduler = Arc::new(BatchScheduler::new(
            llm.clone(),
            SchedulerConfig {
                max_workers: 2,
                deadline: Duration::from_secs(30),
            },
        ));
        let pipeline = Arc::new(ScreeningPipeline::new(
            store.clone(),
            files.clone(),
            guard.clone(),
            scheduler,
            Arc::new(RecordingProgress::default()),
        ));
        Harness {
            pipeline,
            store,
            files,
            guard,
            llm,
            dir,
        }
    }

    fn uploads() -> Vec<UploadedFile> {
        vec![
            UploadedFile::new("a.txt", "cv-a"),
            UploadedFile::new("b.txt", "cv-b"),
            UploadedFile::new("c.txt", "cv-c"),
        ]
    }

    fn three_file_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .with_score("cv-a", 7.5)
            .with_score("cv-b", 8.0)
            .failing_opinion_for("cv-c")
    }

    #[tokio::test]
    async fn test_mixed_batch_returns_every_outcome_and_persists_successes() {
        let h = harness(three_file_llm()).await;

        let run = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();

        let ScreeningRun::Processed(report) = run else {
            panic!("expected a fresh run, got {run:?}");
        };
        assert_eq!(report.state, BatchState::Completed);
        assert_eq!(report.submitted, 3);
        assert_eq!(report.total, 3);
        assert_eq!(report.completed, 3);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.verdict(), BatchVerdict::PartialFailure);

        let failure = report
            .outcomes
            .iter()
            .find(|o| !o.is_success())
            .unwrap();
        assert!(failure.path().ends_with("c.txt"));

        let mut scores: Vec<f64> = report
            .outcomes
            .iter()
            .filter_map(|o| match o {
                ScoringOutcome::Success(s) => Some(s.overall_score),
                ScoringOutcome::Failure(_) => None,
            })
            .collect();
        scores.sort_by(f64::total_cmp);
        assert_eq!(scores, [7.5, 8.0]);

        assert_eq!(h.store.resumes().len(), 2);
        assert_eq!(h.store.analyses().len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_submission_returns_prior_report_without_work() {
        let h = harness(three_file_llm()).await;

        let first = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();
        let ScreeningRun::Processed(first) = first else {
            panic!("expected a fresh run");
        };
        let calls = h.llm.calls();
        let writes = h.store.write_count();

        // Same files in a different order.
        let mut again = uploads();
        again.reverse();
        let second = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", again)
            .await
            .unwrap();

        let ScreeningRun::AlreadyProcessed(prior) = second else {
            panic!("expected prior results, got {second:?}");
        };
        assert_eq!(prior.batch_key, first.batch_key);
        assert_eq!(prior.completed, 3);
        assert_eq!(h.llm.calls(), calls);
        assert_eq!(h.store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_reset_allows_rerun() {
        let h = harness(three_file_llm()).await;

        let ScreeningRun::Processed(first) = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap()
        else {
            panic!("expected a fresh run");
        };
        h.pipeline.reset(&first.batch_key).await.unwrap();

        let again = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();
        assert!(matches!(again, ScreeningRun::Processed(_)));
        assert_eq!(h.store.resumes().len(), 4);
    }

    #[tokio::test]
    async fn test_sessions_do_not_share_processed_state() {
        let h = harness(ScriptedLlm::new()).await;
        let files = vec![UploadedFile::new("a.txt", "cv-a")];

        let one = h.pipeline.run_batch("s1", "IoT Engineer", files.clone()).await.unwrap();
        let two = h.pipeline.run_batch("s2", "IoT Engineer", files).await.unwrap();

        assert!(matches!(one, ScreeningRun::Processed(_)));
        assert!(matches!(two, ScreeningRun::Processed(_)));
    }

    #[tokio::test]
    async fn test_claimed_batch_reports_in_progress() {
        let h = harness(ScriptedLlm::new()).await;
        let job = h
            .store
            .get_job_by_name("IoT Engineer")
            .await
            .unwrap()
            .unwrap();
        let key = BatchKey::derive("session-1", job.id, &uploads());
        assert!(h.guard.should_run(&key).await.unwrap());

        let run = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();

        assert!(matches!(run, ScreeningRun::InProgress(k) if k == key));
        assert_eq!(h.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_upload_counts_as_load_failure() {
        let h = harness(ScriptedLlm::new()).await;

        let ScreeningRun::Processed(report) = h
            .pipeline
            .run_batch(
                "session-1",
                "IoT Engineer",
                vec![
                    UploadedFile::new("a.txt", "cv-a"),
                    UploadedFile::new("broken.bin", vec![0xff, 0xfe]),
                ],
            )
            .await
            .unwrap()
        else {
            panic!("expected a fresh run");
        };

        assert_eq!(report.submitted, 2);
        assert_eq!(report.load_failures, 1);
        assert_eq!(report.total, 1);
        assert_eq!(report.verdict(), BatchVerdict::PartialFailure);
    }

    #[tokio::test]
    async fn test_batch_with_nothing_loadable_releases_its_claim() {
        let h = harness(ScriptedLlm::new()).await;
        let files = vec![UploadedFile::new("empty.txt", "  ")];

        let ScreeningRun::Processed(report) = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", files.clone())
            .await
            .unwrap()
        else {
            panic!("expected a fresh run");
        };
        assert_eq!(report.verdict(), BatchVerdict::NoFilesProcessed);
        assert_eq!(report.load_failures, 1);

        let again = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", files)
            .await
            .unwrap();
        assert!(matches!(again, ScreeningRun::Processed(_)));
        assert_eq!(h.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_never_leaves_orphan_analysis() {
        let h = harness(three_file_llm()).await;
        h.store.fail_resume_when_file_contains("b.txt");

        let ScreeningRun::Processed(report) = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap()
        else {
            panic!("expected a fresh run");
        };

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(h.store.resumes().len(), 1);
        assert_eq!(h.store.analyses().len(), 1);
        let resume_ids: Vec<Uuid> = h.store.resumes().iter().map(|r| r.id).collect();
        assert!(h
            .store
            .analyses()
            .iter()
            .all(|a| resume_ids.contains(&a.resume_id)));
        assert_eq!(report.verdict(), BatchVerdict::PartialFailure);
    }

    #[tokio::test]
    async fn test_unknown_job_and_empty_upload_are_rejected() {
        let h = harness(ScriptedLlm::new()).await;

        let err = h
            .pipeline
            .run_batch("s", "Nope", uploads())
            .await
            .unwrap_err();
        assert!(matches!(err, ScreeningError::UnknownJob(name) if name == "Nope"));

        let err = h
            .pipeline
            .run_batch("s", "IoT Engineer", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ScreeningError::EmptyUpload));
    }

    #[tokio::test]
    async fn test_candidates_are_best_score_first() {
        let h = harness(three_file_llm()).await;
        h.pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();

        let (job, rows) = h.pipeline.candidates("IoT Engineer").await.unwrap();

        assert_eq!(job.name, "IoT Engineer");
        let scores: Vec<f64> = rows.iter().map(|r| r.score).collect();
        assert_eq!(scores, [8.0, 7.5]);
        let (resume, analysis) = h.pipeline.resume(rows[0].resume_id).await.unwrap().unwrap();
        assert_eq!(resume.content, "cv-b");
        assert_eq!(analysis.unwrap().summary, "summary of cv-b");
        assert!(h.pipeline.resume(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clean_job_removes_rows_and_files() {
        let h = harness(three_file_llm()).await;
        h.pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();
        let paths: Vec<String> = h.store.resumes().iter().map(|r| r.file.clone()).collect();
        h.files.remove(&paths[0]).await.unwrap();

        let report = h.pipeline.clean_job("IoT Engineer").await.unwrap();

        assert_eq!(report.deleted.resumes, 2);
        assert_eq!(report.deleted.analyses, 2);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.files_missing, 1);
        assert_eq!(report.files_failed, 0);
        assert!(h.store.resumes().is_empty());
        assert!(!h.files.exists(&paths[1]).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_still_finishes_and_marks_done() {
        let h = harness(three_file_llm().with_default_delay(Duration::from_secs(10))).await;

        // The caller gives up long before scoring ends.
        let gave_up = tokio::time::timeout(
            Duration::from_secs(1),
            h.pipeline.run_batch("session-1", "IoT Engineer", uploads()),
        )
        .await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_secs(60)).await;

        let again = h
            .pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();
        let ScreeningRun::AlreadyProcessed(report) = again else {
            panic!("expected the detached run to have finished, got {again:?}");
        };
        assert_eq!(report.completed, 3);
        assert_eq!(h.store.resumes().len(), 2);
        assert_eq!(h.store.analyses().len(), 2);
    }

    #[tokio::test]
    async fn test_clean_job_keeps_going_past_a_stuck_file() {
        let h = harness(three_file_llm()).await;
        h.pipeline
            .run_batch("session-1", "IoT Engineer", uploads())
            .await
            .unwrap();
        let paths: Vec<String> = h.store.resumes().iter().map(|r| r.file.clone()).collect();

        // A directory where a file should be cannot be removed as a file.
        let stuck = h.dir.path().join(&paths[0]);
        std::fs::remove_file(&stuck).unwrap();
        std::fs::create_dir(&stuck).unwrap();

        let report = h.pipeline.clean_job("IoT Engineer").await.unwrap();

        assert_eq!(report.deleted.resumes, 2);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.files_missing, 0);
        assert!(!h.files.exists(&paths[1]).await.unwrap());
    }
}
