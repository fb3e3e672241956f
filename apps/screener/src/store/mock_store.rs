use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use super::{DeletedCounts, ScreeningStore, StoreError};
use crate::models::job::{Job, NewJob};
use crate::models::resume::{AnalysisRow, CandidateRow, NewAnalysis, NewResume, ResumeRow};

#[derive(Default)]
struct Tables {
    jobs: Vec<Job>,
    resumes: Vec<ResumeRow>,
    analyses: Vec<AnalysisRow>,
    writes: usize,
}

/// In-memory store with failure injection for tests.
#[derive(Default)]
pub struct MockStore {
    tables: Mutex<Tables>,
    /// Résumé creates whose file path contains one of these fragments fail.
    failing_resume_files: Mutex<HashSet<String>>,
    fail_analyses: Mutex<bool>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_resume_when_file_contains(&self, fragment: &str) {
        self.failing_resume_files
            .lock()
            .unwrap()
            .insert(fragment.to_string());
    }

    pub fn fail_analyses(&self) {
        *self.fail_analyses.lock().unwrap() = true;
    }

    pub fn resumes(&self) -> Vec<ResumeRow> {
        self.tables.lock().unwrap().resumes.clone()
    }

    pub fn analyses(&self) -> Vec<AnalysisRow> {
        self.tables.lock().unwrap().analyses.clone()
    }

    /// Successful résumé and analysis inserts so far.
    pub fn write_count(&self) -> usize {
        self.tables.lock().unwrap().writes
    }

    pub async fn seed_job(&self, name: &str, competence: &[&str], strategies: &[&str], qualifications: &[&str]) -> Job {
        let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        self.create_job(NewJob {
            name: name.to_string(),
            competence: to_vec(competence),
            strategies: to_vec(strategies),
            qualifications: to_vec(qualifications),
        })
        .await
        .unwrap()
    }
}

#[async_trait]
impl ScreeningStore for MockStore {
    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.jobs.iter().any(|j| j.name == job.name) {
            return Err(StoreError::DuplicateJob(job.name));
        }
        let row = Job {
            id: Uuid::new_v4(),
            name: job.name,
            competence: job.competence,
            strategies: job.strategies,
            qualifications: job.qualifications,
            created_at: Utc::now(),
        };
        tables.jobs.push(row.clone());
        Ok(row)
    }

    async fn get_job_by_name(&self, name: &str) -> Result<Option<Job>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.jobs.iter().find(|j| j.name == name).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.tables.lock().unwrap().jobs.clone())
    }

    async fn create_resume(&self, resume: NewResume) -> Result<Uuid, StoreError> {
        let failing = self
            .failing_resume_files
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| resume.file.contains(fragment.as_str()));
        if failing {
            return Err(StoreError::Rejected(format!("resume {}", resume.file)));
        }

        let mut tables = self.tables.lock().unwrap();
        let id = Uuid::new_v4();
        tables.resumes.push(ResumeRow {
            id,
            job_id: resume.job_id,
            content: resume.content,
            file: resume.file,
            opinion: resume.opinion,
            competence: Json(resume.competence),
            strategies: Json(resume.strategies),
            qualifications: Json(resume.qualifications),
            created_at: Utc::now(),
        });
        tables.writes += 1;
        Ok(id)
    }

    async fn create_analysis(&self, analysis: NewAnalysis) -> Result<Uuid, StoreError> {
        if *self.fail_analyses.lock().unwrap() {
            return Err(StoreError::Rejected("analysis".to_string()));
        }

        let mut tables = self.tables.lock().unwrap();
        // Mirrors the foreign key on analyses.resume_id.
        if !tables.resumes.iter().any(|r| r.id == analysis.resume_id) {
            return Err(StoreError::Rejected(format!(
                "analysis references unknown resume {}",
                analysis.resume_id
            )));
        }
        let id = Uuid::new_v4();
        tables.analyses.push(AnalysisRow {
            id,
            resume_id: analysis.resume_id,
            job_id: analysis.job_id,
            summary: analysis.summary,
            score: analysis.score,
            created_at: Utc::now(),
        });
        tables.writes += 1;
        Ok(id)
    }

    async fn get_resume(&self, id: Uuid) -> Result<Option<ResumeRow>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.resumes.iter().find(|r| r.id == id).cloned())
    }

    async fn get_analysis_by_resume_id(&self, resume_id: Uuid) -> Result<Option<AnalysisRow>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.analyses.iter().find(|a| a.resume_id == resume_id).cloned())
    }

    async fn list_resumes_by_job_id(&self, job_id: Uuid) -> Result<Vec<ResumeRow>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .resumes
            .iter()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn list_candidates(&self, job_id: Uuid) -> Result<Vec<CandidateRow>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<CandidateRow> = tables
            .analyses
            .iter()
            .filter(|a| a.job_id == job_id)
            .filter_map(|a| {
                let resume = tables.resumes.iter().find(|r| r.id == a.resume_id)?;
                Some(CandidateRow {
                    analysis_id: a.id,
                    resume_id: resume.id,
                    file: resume.file.clone(),
                    summary: a.summary.clone(),
                    opinion: resume.opinion.clone(),
                    score: a.score,
                    created_at: a.created_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(rows)
    }

    async fn delete_all_by_job_id(&self, job_id: Uuid) -> Result<DeletedCounts, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let analyses_before = tables.analyses.len();
        let resumes_before = tables.resumes.len();
        tables.analyses.retain(|a| a.job_id != job_id);
        tables.resumes.retain(|r| r.job_id != job_id);
        Ok(DeletedCounts {
            resumes: (resumes_before - tables.resumes.len()) as u64,
            analyses: (analyses_before - tables.analyses.len()) as u64,
        })
    }
}
