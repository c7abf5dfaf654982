//! SQLite connection pool for the validation cache.
//!
//! File databases run in WAL mode so workers can read cache records while
//! another worker writes one. Migrations from `migrations/` are applied on
//! open. The only table is `file_cache`, owned by [`crate::cache::CacheStore`].
//!
//! # Example
//!
//! ```no_run
//! use sitesync_core::Database;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new(".sitesync-cache.db")).await?;
//! // Hand db to a CacheStore...
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, instrument};

/// Pool size for file databases. SQLite serialises writers anyway.
const FILE_POOL_SIZE: u32 = 5;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Opening or configuring a connection failed.
    #[error("failed to connect to database: {0}")]
    Connection(#[from] sqlx::Error),

    /// Applying the schema failed.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Shared handle to the cache database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the database file at `db_path` in WAL mode and
    /// applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the file cannot be opened,
    /// or `DbError::Migration` if the schema cannot be applied.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_POOL_SIZE)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    /// Opens a private in-memory database, mostly for tests.
    ///
    /// The pool holds one connection: every connection to `:memory:` would
    /// otherwise see its own empty database.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if the schema cannot be applied.
    #[instrument]
    pub async fn new_in_memory() -> Result<Self, DbError> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, DbError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("cache schema up to date");
        Ok(Self { pool })
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_database_file_cache_table_exists() {
        let db = Database::new_in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO file_cache (path, etag, checksum) VALUES ('/tmp/a.pdf', '\"v1\"', NULL)",
        )
        .execute(db.pool())
        .await;

        assert!(result.is_ok(), "file_cache table should exist after migration");
    }

    #[tokio::test]
    async fn test_database_file_cache_path_is_unique() {
        let db = Database::new_in_memory().await.unwrap();

        sqlx::query("INSERT INTO file_cache (path) VALUES ('/tmp/a.pdf')")
            .execute(db.pool())
            .await
            .unwrap();
        let duplicate = sqlx::query("INSERT INTO file_cache (path) VALUES ('/tmp/a.pdf')")
            .execute(db.pool())
            .await;

        assert!(duplicate.is_err(), "path is the primary key");
    }

    #[tokio::test]
    async fn test_database_file_uses_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("cache.db");

        let db = Database::new(&db_path).await.unwrap();
        assert!(db_path.exists());

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
