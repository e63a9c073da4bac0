use crate::config::DatabaseConfig;
use crate::error::BloomError;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Idempotent schema for the wide session table.
pub const SCHEMA: &str = include_str!("../sql/schema.sql");

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, BloomError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), BloomError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
