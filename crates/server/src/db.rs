use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use herald_core::config::PostgresConfig;

/// Connect to PostgreSQL. Storage is required, so failures are fatal.
pub async fn connect(config: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.connection_string())
        .await
        .with_context(|| format!("failed to connect to PostgreSQL at {}:{}", config.host, config.port))?;
    info!(host = %config.host, database = %config.database, "PostgreSQL connected");
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!("database migrations applied");
    Ok(())
}
