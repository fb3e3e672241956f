use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::screening::scheduler::DEFAULT_DEADLINE;

/// Where uploaded résumé files are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: String },
    S3(S3Config),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When unset, processed-batch state lives in process memory.
    pub redis_url: Option<String>,
    pub storage: StorageBackend,
    pub anthropic_api_key: String,
    pub batch_deadline: Duration,
    pub max_concurrent_scoring: usize,
    pub guard_ttl: Duration,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let max_concurrent_scoring = parse_env("MAX_CONCURRENT_SCORING", 4usize)?;
        if max_concurrent_scoring == 0 {
            bail!("MAX_CONCURRENT_SCORING must be greater than zero");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            storage: storage_from_env()?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            batch_deadline: Duration::from_secs(parse_env(
                "BATCH_DEADLINE_SECS",
                DEFAULT_DEADLINE.as_secs(),
            )?),
            max_concurrent_scoring,
            guard_ttl: Duration::from_secs(parse_env("GUARD_TTL_SECS", 86_400u64)?),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 25 * 1024 * 1024usize)?,
            port: parse_env("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn storage_from_env() -> Result<StorageBackend> {
    let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".to_string());
    parse_storage_backend(&backend, |key| std::env::var(key).ok())
}

fn parse_storage_backend(
    backend: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<StorageBackend> {
    let require = |key: &str| {
        lookup(key).with_context(|| {
            format!("Environment variable '{key}' is required when STORAGE_BACKEND=s3")
        })
    };

    match backend.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(StorageBackend::Local {
            root: lookup("STORAGE_ROOT").unwrap_or_else(|| "storage".to_string()),
        }),
        "s3" => Ok(StorageBackend::S3(S3Config {
            bucket: require("S3_BUCKET")?,
            endpoint: require("S3_ENDPOINT")?,
            access_key_id: require("AWS_ACCESS_KEY_ID")?,
            secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
        })),
        other => bail!("STORAGE_BACKEND must be 'local' or 's3', got '{other}'"),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
