//! Concurrent download pipeline.
//!
//! Producers enqueue [`DownloadTask`]s on a [`WorkQueue`]; a [`WorkerPool`]
//! drains it with a shared [`Fetcher`], which decides per task whether to
//! skip, conditionally re-fetch or download, and reports through the task's
//! [`Observer`].
//!
//! # Features
//!
//! - Streaming downloads in 8 KiB chunks, no transfer deadline
//! - `ETag`/`If-None-Match` revalidation backed by a SQLite cache
//! - Producer checksums that force a re-download when they change
//! - Allow/deny extension lists with a `video` alias
//! - Optional keeping of replaced files as `<stem>-old.<ext>`
//! - Width-aware status lines
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitesync_core::download::{DownloadTask, Fetcher, HttpClient, LogObserver};
//! use sitesync_core::cache::CacheStore;
//! use sitesync_core::{Database, PipelineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(PipelineConfig::new("/srv/courses"));
//! let cache = CacheStore::new(Database::new_in_memory().await?);
//! let fetcher = Fetcher::new(config, HttpClient::new(), Arc::new(cache));
//!
//! let task = DownloadTask::new("w1", "Week 1/sheet.pdf", "https://example.com/sheet.pdf")
//!     .with_observer(Arc::new(LogObserver));
//! let action = fetcher.fetch(&task, &CancellationToken::new()).await?;
//! println!("{action:?}");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
pub mod extension;
mod fetcher;
pub mod filename;
mod observer;
pub mod status;
mod task;

pub use client::HttpClient;
pub use constants::DEFAULT_WORKERS;
pub use engine::{DrainReport, EngineError, WorkQueue, WorkerPool};
pub use error::{FetchError, FetchErrorKind};
pub use extension::ExtensionPolicy;
pub use fetcher::{Action, Fetcher, ReplacementHook};
pub use observer::{LogObserver, Observer, ObserverHandle};
pub use status::{Cut, FitOptions, Section, fit_sections, terminal_width};
pub use task::{DownloadTask, RequestOptions};
