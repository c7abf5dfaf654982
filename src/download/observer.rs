//! Progress notifications for producers and front ends.
//!
//! Producers attach an [`Observer`] to each task. The pipeline reports the
//! outcome of the task through it, keyed by the task's unique key. A task
//! without an observer is processed the same way; every notification is then
//! a no-op.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

/// Receiver of per-task notifications.
///
/// Implementations are called from worker tasks and must not block.
pub trait Observer: Send + Sync {
    /// A producer started working on `key`.
    fn start(&self, key: &str, msg: Option<&str>);

    /// The task finished and wrote a file.
    fn success(&self, key: &str, msg: Option<&str>);

    /// The task finished but something looked off (e.g. no `ETag`).
    fn warning(&self, key: &str, msg: Option<&str>);

    /// The task was abandoned.
    fn error(&self, key: &str, msg: &str);

    /// A file was created where none existed.
    fn added_new_file(&self, _key: &str, _path: &Path) {}

    /// An existing file was overwritten. `old_path` is set when the previous
    /// content was kept next to it.
    fn replaced_file(&self, _key: &str, _path: &Path, _old_path: Option<&Path>) {}
}

/// Optional observer reference carried by a task.
#[derive(Clone, Default)]
pub struct ObserverHandle(Option<Arc<dyn Observer>>);

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverHandle")
            .field(&self.0.as_ref().map(|_| "dyn Observer"))
            .finish()
    }
}

impl ObserverHandle {
    /// Wraps an observer.
    #[must_use]
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self(Some(observer))
    }

    /// A handle that drops every notification.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// True when an observer is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.is_some()
    }

    /// Forwards [`Observer::start`].
    pub fn start(&self, key: &str, msg: Option<&str>) {
        if let Some(observer) = &self.0 {
            observer.start(key, msg);
        }
    }

    /// Forwards [`Observer::success`].
    pub fn success(&self, key: &str, msg: Option<&str>) {
        if let Some(observer) = &self.0 {
            observer.success(key, msg);
        }
    }

    /// Forwards [`Observer::warning`].
    pub fn warning(&self, key: &str, msg: Option<&str>) {
        if let Some(observer) = &self.0 {
            observer.warning(key, msg);
        }
    }

    /// Forwards [`Observer::error`].
    pub fn error(&self, key: &str, msg: &str) {
        if let Some(observer) = &self.0 {
            observer.error(key, msg);
        }
    }

    /// Forwards [`Observer::added_new_file`].
    pub fn added_new_file(&self, key: &str, path: &Path) {
        if let Some(observer) = &self.0 {
            observer.added_new_file(key, path);
        }
    }

    /// Forwards [`Observer::replaced_file`].
    pub fn replaced_file(&self, key: &str, path: &Path, old_path: Option<&Path>) {
        if let Some(observer) = &self.0 {
            observer.replaced_file(key, path, old_path);
        }
    }
}

impl From<Arc<dyn Observer>> for ObserverHandle {
    fn from(observer: Arc<dyn Observer>) -> Self {
        Self::new(observer)
    }
}

/// Observer that forwards notifications to `tracing`.
///
/// Used by the command-line front end, where the log is the only output.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn start(&self, key: &str, msg: Option<&str>) {
        info!(key, msg = msg.unwrap_or_default(), "started");
    }

    fn success(&self, key: &str, msg: Option<&str>) {
        info!(key, msg = msg.unwrap_or_default(), "finished");
    }

    fn warning(&self, key: &str, msg: Option<&str>) {
        warn!(key, msg = msg.unwrap_or_default(), "finished with warning");
    }

    fn error(&self, key: &str, msg: &str) {
        error!(key, msg, "failed");
    }
}
