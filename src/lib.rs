//! Sitesync Core Library
//!
//! Keeps a local directory tree in sync with files published on remote
//! sites. Producers (crawlers, manifest readers) describe files as
//! [`DownloadTask`]s; a worker pool fetches them, revalidating existing files
//! with `ETag`s and producer checksums so unchanged content is never
//! transferred twice.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Pipeline settings loaded from TOML
//! - [`db`] - Database connection and schema management
//! - [`cache`] - Per-path `ETag` and checksum records
//! - [`download`] - Queue, workers, fetcher, observers and status lines

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod db;
pub mod download;

// Re-export commonly used types
pub use cache::{CacheError, CacheRecord, CacheRepository, CacheStore};
pub use config::{ConfigError, PipelineConfig};
pub use db::{Database, DbError};
pub use download::{
    Action, DEFAULT_WORKERS, DownloadTask, DrainReport, EngineError, Fetcher, FetchError,
    HttpClient, LogObserver, Observer, WorkQueue, WorkerPool,
};
