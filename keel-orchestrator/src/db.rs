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
    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id BIGSERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            creator_id BIGINT NOT NULL,
            status VARCHAR(20) NOT NULL,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create stages table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stages (
            id BIGSERIAL PRIMARY KEY,
            pipeline_id BIGINT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL,
            UNIQUE (pipeline_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create tasks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id BIGSERIAL PRIMARY KEY,
            pipeline_id BIGINT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            stage_id BIGINT NOT NULL REFERENCES stages(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL,
            engine VARCHAR(50) NOT NULL,
            dsn TEXT NOT NULL,
            payload JSONB NOT NULL,
            status VARCHAR(20) NOT NULL,
            depends_on TEXT[] NOT NULL DEFAULT '{}',
            max_attempts INTEGER NOT NULL DEFAULT 1,
            timeout_seconds BIGINT,
            attempts INTEGER NOT NULL DEFAULT 0,
            failure_reason VARCHAR(50),
            failure_message TEXT,
            output JSONB,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            UNIQUE (stage_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create bookmarks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            id UUID PRIMARY KEY,
            user_id BIGINT NOT NULL,
            link TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_pipelines_status ON pipelines(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stages_pipeline_id ON stages(pipeline_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_pipeline_id ON tasks(pipeline_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bookmarks_user_id ON bookmarks(user_id, created_at, id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
