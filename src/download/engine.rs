//! Work queue and worker pool.
//!
//! Producers push [`DownloadTask`]s into a shared, unbounded FIFO
//! [`WorkQueue`]. A fixed pool of workers drains it, each running the
//! [`Fetcher`] on one task at a time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitesync_core::cache::CacheStore;
//! use sitesync_core::download::{DownloadTask, Fetcher, HttpClient, WorkQueue, WorkerPool};
//! use sitesync_core::{Database, PipelineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(PipelineConfig::new("/srv/courses"));
//! let cache = CacheStore::new(Database::new(&config.cache_db_path()).await?);
//! let fetcher = Fetcher::new(config.clone(), HttpClient::new(), Arc::new(cache));
//!
//! let queue = WorkQueue::new();
//! let pool = WorkerPool::start(config.workers, queue.clone(), fetcher)?;
//!
//! let producer = tokio::spawn({
//!     let queue = queue.clone();
//!     async move {
//!         let _ = queue.push(DownloadTask::new("k", "a.pdf", "https://example.com/a.pdf"));
//!     }
//! });
//!
//! let report = pool.run([producer]).await?;
//! println!("processed {}", report.processed);
//! # Ok(())
//! # }
//! ```
//!
//! # Failure model
//!
//! - A task error becomes one `Observer::error` call; the worker moves on.
//! - A panic inside the fetcher is caught and reported the same way.
//! - Cancellation stops every worker at its next suspension point. A worker
//!   cancelled mid-task returns [`FetchError::Cancelled`] instead of reporting
//!   it through the observer.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::constants::DEFAULT_WORKERS;
use super::error::FetchError;
use super::fetcher::Fetcher;
use super::task::DownloadTask;
use crate::config::{MAX_WORKERS, MIN_WORKERS};

/// Error type for queue and pool operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The receiving side of the queue is gone.
    #[error("work queue closed")]
    QueueClosed,
}

#[derive(Debug, Default)]
struct Progress {
    unfinished: AtomicUsize,
    processed: AtomicUsize,
    drained: Notify,
}

/// Unbounded FIFO shared by producers and workers.
///
/// Cloning is cheap; all clones refer to the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<DownloadTask>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<DownloadTask>>>,
    progress: Arc<Progress>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            progress: Arc::new(Progress::default()),
        }
    }

    /// Appends a task. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::QueueClosed`] if the receiving side was dropped.
    pub fn push(&self, task: DownloadTask) -> Result<(), EngineError> {
        self.progress.unfinished.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.task_done();
            return Err(EngineError::QueueClosed);
        }
        Ok(())
    }

    /// Waits for the next task. Returns `None` once `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<DownloadTask> {
        let mut receiver = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            task = receiver.recv() => task,
        }
    }

    /// Marks one previously pushed task as processed.
    pub fn task_done(&self) {
        self.progress.processed.fetch_add(1, Ordering::SeqCst);
        let previous = self
            .progress
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.progress.drained.notify_waiters();
        }
    }

    /// Number of tasks pushed but not yet marked processed.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.progress.unfinished.load(Ordering::SeqCst)
    }

    /// Number of tasks marked processed so far.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.progress.processed.load(Ordering::SeqCst)
    }

    /// True when every pushed task has been processed.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.unfinished() == 0
    }

    /// Waits until every pushed task has been processed.
    pub async fn join(&self) {
        loop {
            let notified = self.progress.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_drained() {
                return;
            }
            notified.await;
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks marked processed, whatever their outcome.
    pub processed: usize,
    /// False when the run was stopped before the queue drained.
    pub drained: bool,
}

/// Fixed-size pool of workers draining a [`WorkQueue`].
#[derive(Debug)]
pub struct WorkerPool {
    queue: WorkQueue,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<Result<(), FetchError>>>,
}

impl WorkerPool {
    /// Spawns `workers` workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkerCount`] if `workers` is outside
    /// `1..=100`.
    #[instrument(level = "debug", skip(queue, fetcher))]
    pub fn start(workers: usize, queue: WorkQueue, fetcher: Fetcher) -> Result<Self, EngineError> {
        Self::start_with_token(workers, queue, fetcher, CancellationToken::new())
    }

    /// Like [`start`](Self::start) but stops when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidWorkerCount`] if `workers` is outside
    /// `1..=100`.
    pub fn start_with_token(
        workers: usize,
        queue: WorkQueue,
        fetcher: Fetcher,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(EngineError::InvalidWorkerCount { value: workers });
        }

        debug!(workers, "starting worker pool");
        let fetcher = Arc::new(fetcher);
        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    queue.clone(),
                    Arc::clone(&fetcher),
                    cancel.clone(),
                ))
            })
            .collect();

        Ok(Self {
            queue,
            cancel,
            workers: handles,
        })
    }

    /// Starts a pool with [`DEFAULT_WORKERS`] workers.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches [`start`](Self::start).
    pub fn start_default(queue: WorkQueue, fetcher: Fetcher) -> Result<Self, EngineError> {
        Self::start(DEFAULT_WORKERS, queue, fetcher)
    }

    /// Token that stops the whole pool when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for all producers, then for the queue to drain, then stops the
    /// workers.
    ///
    /// A cancelled token ends the wait early; the report then says the queue
    /// did not drain.
    ///
    /// # Errors
    ///
    /// Currently infallible; task failures are reported through observers.
    #[instrument(skip(self, producers), fields(workers = self.workers.len()))]
    pub async fn run<I>(self, producers: I) -> Result<DrainReport, EngineError>
    where
        I: IntoIterator<Item = JoinHandle<()>>,
    {
        let cancel = self.cancel.clone();
        let queue = self.queue.clone();

        let finished = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = async {
                for producer in producers {
                    if let Err(e) = producer.await {
                        warn!(error = %e, "producer task panicked");
                    }
                }
                debug!(unfinished = queue.unfinished(), "all producers finished");
                queue.join().await;
            } => true,
        };

        if finished {
            info!(processed = queue.processed(), "queue drained");
        } else {
            info!(
                processed = queue.processed(),
                unfinished = queue.unfinished(),
                "pipeline stopped before queue drained"
            );
        }

        Ok(self.shutdown_inner(finished).await)
    }

    /// Stops every worker at its next suspension point and waits for them.
    pub async fn shutdown(self) -> DrainReport {
        let drained = self.queue.is_drained();
        self.shutdown_inner(drained).await
    }

    async fn shutdown_inner(self, drained: bool) -> DrainReport {
        self.cancel.cancel();
        for handle in self.workers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "worker stopped mid-task"),
                Err(e) => warn!(error = %e, "worker task panicked"),
            }
        }
        DrainReport {
            processed: self.queue.processed(),
            drained,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("fetcher panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("fetcher panicked: {msg}")
    } else {
        "fetcher panicked".to_string()
    }
}

/// One worker: take a task, fetch it, mark it done, repeat.
///
/// Returns `Ok(())` when cancelled while waiting for work and
/// `Err(FetchError::Cancelled)` when cancelled mid-task.
async fn run_worker(
    worker_id: usize,
    queue: WorkQueue,
    fetcher: Arc<Fetcher>,
    cancel: CancellationToken,
) -> Result<(), FetchError> {
    while let Some(task) = queue.next(&cancel).await {
        debug!(worker_id, key = %task.key, "picked up task");

        let result = match AssertUnwindSafe(fetcher.fetch(&task, &cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(FetchError::unexpected(panic_message(payload.as_ref()))),
        };

        match result {
            Ok(action) => debug!(worker_id, key = %task.key, ?action, "task finished"),
            Err(e) if e.is_cancelled() => {
                debug!(worker_id, key = %task.key, "task cancelled");
                return Err(e);
            }
            Err(e) => {
                error!(
                    worker_id,
                    key = %task.key,
                    url = %task.url,
                    kind = %e.kind(),
                    error = %e,
                    "worker got an error"
                );
                task.observer.error(
                    &task.key,
                    &format!("Could not download file from url: {}. Error: {e}", task.url),
                );
            }
        }

        queue.task_done();
    }

    debug!(worker_id, "worker stopping");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn task(key: &str) -> DownloadTask {
        DownloadTask::new(key, format!("{key}.pdf"), "https://example.com/x.pdf")
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        queue.push(task("a")).unwrap();
        queue.push(task("b")).unwrap();
        queue.push(task("c")).unwrap();

        let keys: Vec<String> = [
            queue.next(&cancel).await.unwrap(),
            queue.next(&cancel).await.unwrap(),
            queue.next(&cancel).await.unwrap(),
        ]
        .into_iter()
        .map(|t| t.key)
        .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_next_returns_none_when_cancelled() {
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_wakes_on_push() {
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        let waiter = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next(&cancel).await.map(|t| t.key) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(task("late")).unwrap();
        assert_eq!(waiter.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_join_waits_for_task_done() {
        let queue = WorkQueue::new();
        queue.push(task("a")).unwrap();
        queue.push(task("b")).unwrap();
        assert_eq!(queue.unfinished(), 2);

        let joiner = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.join().await })
        };

        queue.task_done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!joiner.is_finished());

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), joiner)
            .await
            .unwrap()
            .unwrap();
        assert!(queue.is_drained());
        assert_eq!(queue.processed(), 2);
    }

    #[tokio::test]
    async fn test_join_on_empty_queue_returns_immediately() {
        let queue = WorkQueue::new();
        tokio::time::timeout(Duration::from_millis(100), queue.join())
            .await
            .unwrap();
    }

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "fetcher panicked: boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaput"));
        assert_eq!(panic_message(payload.as_ref()), "fetcher panicked: kaput");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "fetcher panicked");
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidWorkerCount { value: 0 };
        let msg = error.to_string();
        assert!(msg.contains("invalid worker count"));
        assert!(msg.contains("100"));
    }
}
