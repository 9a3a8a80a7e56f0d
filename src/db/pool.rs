use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::types::WorkerResult;

pub async fn create_pool(config: &DatabaseConfig) -> WorkerResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(&config.url)
        .await?;

    health_check(&pool).await?;

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> WorkerResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub async fn run_migrations(pool: &PgPool) -> WorkerResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::types::WorkerError::Database(e.into()))
}
