//! Validation cache for downloaded files.
//!
//! Every file the pipeline writes gets a row keyed by its absolute path,
//! holding the last `ETag` the server sent and the last content checksum the
//! producer supplied. The fetcher reads these to decide whether a refresh is
//! needed and to build conditional requests.
//!
//! Rows are created on the first successful write for a path and updated on
//! every later one. They are never deleted. There is no per-path locking: two
//! workers writing the same path race and the last write wins.
//!
//! # Example
//!
//! ```ignore
//! use sitesync_core::cache::CacheStore;
//! use sitesync_core::Database;
//!
//! let store = CacheStore::new(Database::new_in_memory().await?);
//! store.save_etag(path, "\"abc\"").await?;
//! assert_eq!(store.etag(path).await?.as_deref(), Some("\"abc\""));
//! ```

mod repository;

pub use repository::CacheRepository;

use std::path::Path;

use sqlx::Row;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::Database;

/// Errors raised by cache reads and writes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The underlying query failed.
    #[error("cache database error for {path}: {source}")]
    Database {
        /// Cache key the query was about.
        path: String,
        /// The underlying sqlx error.
        #[source]
        source: sqlx::Error,
    },
}

impl CacheError {
    fn database(path: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            path: path.into(),
            source,
        }
    }
}

/// Validation metadata stored for one destination path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// Last `ETag` returned by the server for this file.
    pub etag: Option<String>,
    /// Last checksum the producer supplied when the file was written.
    pub checksum: Option<String>,
}

/// SQLite-backed cache store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: Database,
}

fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CacheStore {
    /// Creates a store on top of an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the full record for `path`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn get(&self, path: &Path) -> Result<Option<CacheRecord>, CacheError> {
        let key = cache_key(path);
        let row = sqlx::query("SELECT etag, checksum FROM file_cache WHERE path = ?")
            .bind(&key)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| CacheError::database(&key, e))?;

        Ok(row.map(|row| CacheRecord {
            etag: row.get("etag"),
            checksum: row.get("checksum"),
        }))
    }

    /// Returns the stored `ETag` for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn etag(&self, path: &Path) -> Result<Option<String>, CacheError> {
        Ok(self.get(path).await?.and_then(|record| record.etag))
    }

    /// Returns the stored checksum for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn checksum(&self, path: &Path) -> Result<Option<String>, CacheError> {
        Ok(self.get(path).await?.and_then(|record| record.checksum))
    }

    /// Returns true when `checksum` matches the stored value for `path`.
    ///
    /// A missing row or a missing stored checksum never matches.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn is_checksum_same(&self, path: &Path, checksum: &str) -> Result<bool, CacheError> {
        Ok(self.checksum(path).await?.as_deref() == Some(checksum))
    }

    /// Stores `etag` for `path`, keeping any stored checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the upsert fails.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn save_etag(&self, path: &Path, etag: &str) -> Result<(), CacheError> {
        let key = cache_key(path);
        sqlx::query(
            r"INSERT INTO file_cache (path, etag) VALUES (?, ?)
              ON CONFLICT(path) DO UPDATE SET
                etag = excluded.etag,
                updated_at = datetime('now')",
        )
        .bind(&key)
        .bind(etag)
        .execute(self.db.pool())
        .await
        .map_err(|e| CacheError::database(&key, e))?;

        debug!("stored etag");
        Ok(())
    }

    /// Stores `checksum` for `path`, keeping any stored `ETag`.
    ///
    /// `None` clears a previously stored checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the upsert fails.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn save_checksum(
        &self,
        path: &Path,
        checksum: Option<&str>,
    ) -> Result<(), CacheError> {
        let key = cache_key(path);
        sqlx::query(
            r"INSERT INTO file_cache (path, checksum) VALUES (?, ?)
              ON CONFLICT(path) DO UPDATE SET
                checksum = excluded.checksum,
                updated_at = datetime('now')",
        )
        .bind(&key)
        .bind(checksum)
        .execute(self.db.pool())
        .await
        .map_err(|e| CacheError::database(&key, e))?;

        debug!(has_checksum = checksum.is_some(), "stored checksum");
        Ok(())
    }

    /// Returns the number of cached paths.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn len(&self) -> Result<i64, CacheError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM file_cache")
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| CacheError::database("*", e))?;
        Ok(count.0)
    }

    /// Returns true when nothing has been cached yet.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if the query fails.
    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
