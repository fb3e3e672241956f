//! Batch progress reporting.
//!
//! The scheduler emits events through `ProgressReporter`; the HTTP layer reads
//! the latest snapshot per batch from `ProgressBoard`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use crate::screening::models::{BatchKey, BatchState};

/// Events emitted by the scheduler while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        batch_key: BatchKey,
        total: usize,
    },
    FileCompleted {
        batch_key: BatchKey,
        completed: usize,
        total: usize,
        path: String,
        succeeded: bool,
    },
    Finished {
        batch_key: BatchKey,
        state: BatchState,
        completed: usize,
        total: usize,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Latest known progress of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub batch_key: BatchKey,
    pub state: BatchState,
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// `completed / total` in `[0, 1]`.
    pub ratio: f64,
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    fn new(batch_key: BatchKey, total: usize) -> Self {
        let mut snapshot = Self {
            batch_key,
            state: BatchState::Running,
            completed: 0,
            total,
            succeeded: 0,
            failed: 0,
            ratio: 0.0,
            message: String::new(),
            updated_at: Utc::now(),
        };
        snapshot.refresh();
        snapshot
    }

    fn refresh(&mut self) {
        self.ratio = progress_ratio(self.completed, self.total);
        self.message = match self.state {
            BatchState::TimedOut => format!(
                "Timed out: {} of {} résumés processed",
                self.completed, self.total
            ),
            BatchState::Aborted => format!(
                "Aborted: {} of {} résumés processed",
                self.completed, self.total
            ),
            _ => format!("{} of {} résumés processed", self.completed, self.total),
        };
        self.updated_at = Utc::now();
    }
}

pub fn progress_ratio(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (completed as f64 / total as f64).clamp(0.0, 1.0)
}

/// Keeps the latest snapshot of each batch seen by this process, until
/// `ttl` passes without an update.
pub struct ProgressBoard {
    snapshots: RwLock<HashMap<BatchKey, Tracked>>,
    ttl: Duration,
}

struct Tracked {
    snapshot: ProgressSnapshot,
    touched: Instant,
}

impl ProgressBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn snapshot(&self, batch_key: &BatchKey) -> Option<ProgressSnapshot> {
        let snapshots = self.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        snapshots
            .get(batch_key)
            .filter(|t| t.touched.elapsed() < self.ttl)
            .map(|t| t.snapshot.clone())
    }

    pub fn forget(&self, batch_key: &BatchKey) {
        self.write().remove(batch_key);
    }

    /// Write access with expired snapshots already evicted.
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<BatchKey, Tracked>> {
        let mut snapshots = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        snapshots.retain(|_, t| t.touched.elapsed() < ttl);
        snapshots
    }
}

/// The snapshot for `batch_key`, created if missing and marked as updated now.
fn track(
    snapshots: &mut HashMap<BatchKey, Tracked>,
    batch_key: BatchKey,
    total: usize,
) -> &mut ProgressSnapshot {
    let now = Instant::now();
    let tracked = snapshots.entry(batch_key).or_insert_with(|| Tracked {
        snapshot: ProgressSnapshot::new(batch_key, total),
        touched: now,
    });
    tracked.touched = now;
    &mut tracked.snapshot
}

impl ProgressReporter for ProgressBoard {
    fn report(&self, event: ProgressEvent) {
        let mut guard = self.write();

        match event {
            ProgressEvent::Started { batch_key, total } => {
                info!(batch_key = %batch_key, total, "Batch running");
                *track(&mut guard, batch_key, total) = ProgressSnapshot::new(batch_key, total);
            }
            ProgressEvent::FileCompleted {
                batch_key,
                completed,
                total,
                path,
                succeeded,
            } => {
                info!(
                    batch_key = %batch_key,
                    path = %path,
                    succeeded,
                    "Processed {completed}/{total}"
                );
                let snapshot = track(&mut guard, batch_key, total);
                // Counts only move forward.
                if completed > snapshot.completed {
                    snapshot.completed = completed;
                }
                if succeeded {
                    snapshot.succeeded += 1;
                } else {
                    snapshot.failed += 1;
                }
                snapshot.refresh();
            }
            ProgressEvent::Finished {
                batch_key,
                state,
                completed,
                total,
            } => {
                let snapshot = track(&mut guard, batch_key, total);
                snapshot.state = state;
                snapshot.completed = completed;
                snapshot.refresh();
            }
        }
    }
}
