use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        competence TEXT[] NOT NULL DEFAULT '{}',
        strategies TEXT[] NOT NULL DEFAULT '{}',
        qualifications TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resumes (
        id UUID PRIMARY KEY,
        job_id UUID NOT NULL REFERENCES jobs(id),
        content TEXT NOT NULL,
        file TEXT NOT NULL,
        opinion TEXT NOT NULL,
        competence JSONB NOT NULL,
        strategies JSONB NOT NULL,
        qualifications JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analyses (
        id UUID PRIMARY KEY,
        resume_id UUID NOT NULL UNIQUE REFERENCES resumes(id),
        job_id UUID NOT NULL REFERENCES jobs(id),
        summary TEXT NOT NULL,
        score DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS resumes_job_id_idx ON resumes (job_id)",
    "CREATE INDEX IF NOT EXISTS analyses_job_id_idx ON analyses (job_id)",
];

/// Creates the screening tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Database schema ready");
    Ok(())
}
