//! Processed-State Guard.
//!
//! Clients re-send the same upload whenever their view re-renders. The guard
//! makes that idempotent: a batch key runs at most once between a `reset`
//! and the next `mark_done`, and later calls get the stored report instead
//! of a second round of LLM calls and inserts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::screening::models::{BatchKey, BatchReport};

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt guard state: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// State recorded for a claimed batch key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunState {
    pub batch_key: BatchKey,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<BatchReport>,
}

#[async_trait]
pub trait RunGuard: Send + Sync {
    /// Atomically claims `key`. Returns `false` if it is already running or done.
    async fn should_run(&self, key: &BatchKey) -> Result<bool, GuardError>;

    async fn mark_done(&self, key: &BatchKey, report: &BatchReport) -> Result<(), GuardError>;

    async fn state(&self, key: &BatchKey) -> Result<Option<BatchRunState>, GuardError>;

    /// Forgets `key` so the next submission runs again.
    async fn reset(&self, key: &BatchKey) -> Result<(), GuardError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-process guard
// ────────────────────────────────────────────────────────────────────────────

/// Keeps batch states in process memory. Entries expire `ttl` after their
/// last write, like the Redis keys do.
pub struct MemoryRunGuard {
    runs: Mutex<HashMap<BatchKey, Entry>>,
    ttl: Duration,
}

struct Entry {
    state: BatchRunState,
    expires_at: Instant,
}

impl MemoryRunGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    async fn live_runs(&self) -> MutexGuard<'_, HashMap<BatchKey, Entry>> {
        let mut runs = self.runs.lock().await;
        let now = Instant::now();
        runs.retain(|_, entry| entry.expires_at > now);
        runs
    }

    fn entry(&self, state: BatchRunState) -> Entry {
        Entry {
            state,
            expires_at: Instant::now() + self.ttl,
        }
    }
}

#[async_trait]
impl RunGuard for MemoryRunGuard {
    async fn should_run(&self, key: &BatchKey) -> Result<bool, GuardError> {
        let mut runs = self.live_runs().await;
        if runs.contains_key(key) {
            return Ok(false);
        }
        let entry = self.entry(BatchRunState {
            batch_key: *key,
            completed: false,
            report: None,
        });
        runs.insert(*key, entry);
        Ok(true)
    }

    async fn mark_done(&self, key: &BatchKey, report: &BatchReport) -> Result<(), GuardError> {
        let entry = self.entry(BatchRunState {
            batch_key: *key,
            completed: true,
            report: Some(report.clone()),
        });
        self.live_runs().await.insert(*key, entry);
        Ok(())
    }

    async fn state(&self, key: &BatchKey) -> Result<Option<BatchRunState>, GuardError> {
        Ok(self.live_runs().await.get(key).map(|e| e.state.clone()))
    }

    async fn reset(&self, key: &BatchKey) -> Result<(), GuardError> {
        self.live_runs().await.remove(key);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis guard (shared by every replica, expires with the session)
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisRunGuard {
    conn: MultiplexedConnection,
    ttl: Duration,
}

impl RedisRunGuard {
    pub async fn connect(client: &redis::Client, ttl: Duration) -> Result<Self, GuardError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, ttl })
    }

    fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

pub fn redis_key(key: &BatchKey) -> String {
    format!("screener:batch:{key}")
}

/// `SET key value [NX] EX ttl`: NX only for the initial claim.
fn set_command(
    key: &BatchKey,
    state: &BatchRunState,
    ttl_secs: u64,
    only_if_new: bool,
) -> Result<redis::Cmd, GuardError> {
    let mut cmd = redis::cmd("SET");
    cmd.arg(redis_key(key)).arg(serde_json::to_string(state)?);
    if only_if_new {
        cmd.arg("NX");
    }
    cmd.arg("EX").arg(ttl_secs);
    Ok(cmd)
}

#[async_trait]
impl RunGuard for RedisRunGuard {
    async fn should_run(&self, key: &BatchKey) -> Result<bool, GuardError> {
        let state = BatchRunState {
            batch_key: *key,
            completed: false,
            report: None,
        };
        let mut conn = self.conn.clone();
        let claimed: Option<String> = set_command(key, &state, self.ttl_secs(), true)?
            .query_async(&mut conn)
            .await?;
        debug!(batch_key = %key, claimed = claimed.is_some(), "Guard claim");
        Ok(claimed.is_some())
    }

    async fn mark_done(&self, key: &BatchKey, report: &BatchReport) -> Result<(), GuardError> {
        let state = BatchRunState {
            batch_key: *key,
            completed: true,
            report: Some(report.clone()),
        };
        let mut conn = self.conn.clone();
        set_command(key, &state, self.ttl_secs(), false)?
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn state(&self, key: &BatchKey) -> Result<Option<BatchRunState>, GuardError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(redis_key(key))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(GuardError::from)
    }

    async fn reset(&self, key: &BatchKey) -> Result<(), GuardError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(redis_key(key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
