use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Pipeline definitions are stored whole; the scalar columns serve listing
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            repository TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            definition JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Execution history outlives its pipeline, so no foreign key
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL,
            build_number BIGINT NOT NULL,
            status VARCHAR(50) NOT NULL,
            repository TEXT NOT NULL,
            branch TEXT NOT NULL,
            author TEXT,
            started_at TIMESTAMPTZ NOT NULL,
            finished_at TIMESTAMPTZ,
            duration_ms BIGINT,
            data JSONB NOT NULL,
            UNIQUE (pipeline_id, build_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per pipeline; the upsert is the build-number allocator
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_counters (
            pipeline_id UUID PRIMARY KEY,
            last_number BIGINT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_started_at ON executions(started_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_pipeline ON executions(pipeline_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
