mod config;
mod db;
mod errors;
mod jobs;
mod llm_client;
mod models;
mod routes;
mod screening;
mod state;
mod storage;
mod store;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, S3Config, StorageBackend};
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::screening::guard::{MemoryRunGuard, RedisRunGuard, RunGuard};
use crate::screening::pipeline::ScreeningPipeline;
use crate::screening::progress::ProgressBoard;
use crate::screening::scheduler::{BatchScheduler, SchedulerConfig};
use crate::state::AppState;
use crate::storage::{FileStore, LocalFileStore, S3FileStore};
use crate::store::{PgStore, ScreeningStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;
    let store: Arc<dyn ScreeningStore> = Arc::new(PgStore::new(db));

    // Processed-batch guard: Redis when configured, process memory otherwise
    let guard: Arc<dyn RunGuard> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let guard = RedisRunGuard::connect(&client, config.guard_ttl).await?;
            info!("Batch guard backed by Redis");
            Arc::new(guard)
        }
        None => {
            info!("REDIS_URL not set, batch guard kept in memory");
            Arc::new(MemoryRunGuard::new(config.guard_ttl))
        }
    };

    // Initialize résumé file storage
    let files: Arc<dyn FileStore> = match &config.storage {
        StorageBackend::Local { root } => {
            info!("Storing uploads under {root}");
            Arc::new(LocalFileStore::new(root.as_str()))
        }
        StorageBackend::S3(s3) => {
            let client = build_s3_client(s3).await;
            info!("Storing uploads in S3 bucket {}", s3.bucket);
            Arc::new(S3FileStore::new(client, s3.bucket.clone()))
        }
    };

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let scheduler = Arc::new(BatchScheduler::new(
        llm,
        SchedulerConfig {
            max_workers: config.max_concurrent_scoring,
            deadline: config.batch_deadline,
        },
    ));
    info!(
        "Scoring pool: {} workers, {}s batch deadline",
        config.max_concurrent_scoring,
        config.batch_deadline.as_secs()
    );

    let progress = Arc::new(ProgressBoard::new(config.guard_ttl));
    let pipeline = Arc::new(ScreeningPipeline::new(
        Arc::clone(&store),
        files,
        guard,
        Arc::clone(&scheduler),
        progress.clone(),
    ));

    // Build app state
    let state = AppState {
        store,
        pipeline,
        progress,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}

/// Waits for Ctrl-C, then stops handing out scoring workers so queued tasks
/// end their batches as aborted instead of running on.
async fn shutdown_signal(scheduler: Arc<BatchScheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received");
    scheduler.shutdown();
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(s3: &S3Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &s3.access_key_id,
        &s3.secret_access_key,
        None,
        None,
        "screener-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&s3.endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
