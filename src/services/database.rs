use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::{str::FromStr, time::Duration};
use uuid::Uuid;

use crate::models::errors::AppError;

/// SQLite-backed document store for users and blogs.
///
/// The `UserStore` and `BlogStore` implementations live next to their traits.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens a connection pool, creating the database file if needed
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                AppError::storage_failed(format!("Failed to connect to database: {}", e))
            })?;

        tracing::info!("Connected to database (max_connections: {})", max_connections);
        Ok(Self { pool })
    }

    /// Applies pending schema migrations
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::debug!("Database migrations applied");
        Ok(())
    }

    /// Round-trips a trivial query; used by the health check
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Checks that `id` is a well-formed document identifier
pub fn parse_id(id: &str) -> Result<String, AppError> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| AppError::invalid_id(id))
}

/// Migrated store backed by a throwaway database file
#[cfg(test)]
pub(crate) async fn test_store() -> (SqliteStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("blog-test.db").display());
    let store = SqliteStore::connect(&url, 1).await.unwrap();
    store.migrate().await.unwrap();
    (store, dir)
}
