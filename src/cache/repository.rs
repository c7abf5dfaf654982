//! Repository seam for validation-cache access.
//!
//! The fetcher depends on this trait rather than on [`CacheStore`] directly so
//! tests and embedders can swap the storage backend.

use std::path::Path;

use async_trait::async_trait;

use super::{CacheError, CacheRecord, CacheStore};

/// Data-access contract for the validation cache.
#[async_trait]
pub trait CacheRepository: Send + Sync {
    /// Reads the record stored for `path`.
    async fn get(&self, path: &Path) -> Result<Option<CacheRecord>, CacheError>;

    /// Stores a new `ETag` for `path`.
    async fn save_etag(&self, path: &Path, etag: &str) -> Result<(), CacheError>;

    /// Stores (or clears) the checksum for `path`.
    async fn save_checksum(&self, path: &Path, checksum: Option<&str>) -> Result<(), CacheError>;
}

#[async_trait]
impl CacheRepository for CacheStore {
    async fn get(&self, path: &Path) -> Result<Option<CacheRecord>, CacheError> {
        CacheStore::get(self, path).await
    }

    async fn save_etag(&self, path: &Path, etag: &str) -> Result<(), CacheError> {
        CacheStore::save_etag(self, path, etag).await
    }

    async fn save_checksum(&self, path: &Path, checksum: Option<&str>) -> Result<(), CacheError> {
        CacheStore::save_checksum(self, path, checksum).await
    }
}
