//! Shared helpers for pipeline integration tests.
//!
//! Provides an observer that records every notification and shortcuts for
//! building a fetcher backed by an in-memory cache.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitesync_core::download::{Fetcher, HttpClient, Observer};
use sitesync_core::{CacheStore, Database, PipelineConfig};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// One observer notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(String),
    Success(String, Option<String>),
    Warning(String, Option<String>),
    Error(String, String),
    Added(String, PathBuf),
    Replaced(String, PathBuf, Option<PathBuf>),
}

/// Observer that keeps every call in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, event: Event) {
        self.events.lock().expect("observer lock poisoned").push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("observer lock poisoned").clone()
    }

    pub fn successes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Success(key, _) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(key, msg) => Some((key, msg)),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Warning(key, _) => Some(key),
                _ => None,
            })
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn start(&self, key: &str, _msg: Option<&str>) {
        self.record(Event::Start(key.to_string()));
    }

    fn success(&self, key: &str, msg: Option<&str>) {
        self.record(Event::Success(key.to_string(), msg.map(str::to_string)));
    }

    fn warning(&self, key: &str, msg: Option<&str>) {
        self.record(Event::Warning(key.to_string(), msg.map(str::to_string)));
    }

    fn error(&self, key: &str, msg: &str) {
        self.record(Event::Error(key.to_string(), msg.to_string()));
    }

    fn added_new_file(&self, key: &str, path: &Path) {
        self.record(Event::Added(key.to_string(), path.to_path_buf()));
    }

    fn replaced_file(&self, key: &str, path: &Path, old_path: Option<&Path>) {
        self.record(Event::Replaced(
            key.to_string(),
            path.to_path_buf(),
            old_path.map(Path::to_path_buf),
        ));
    }
}

/// Temporary root plus a configuration pointing at it.
pub fn temp_root() -> (TempDir, PipelineConfig) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let config = PipelineConfig::new(temp_dir.path());
    (temp_dir, config)
}

/// Cache backed by an in-memory SQLite database.
pub async fn memory_cache() -> Arc<CacheStore> {
    let db = Database::new_in_memory()
        .await
        .expect("failed to open in-memory database");
    Arc::new(CacheStore::new(db))
}

/// Starts a raw HTTP server that announces `declared` body bytes, sends only
/// `sent`, then closes the connection.
///
/// Returns the base URL.
pub async fn truncated_body_server(declared: usize, sent: &'static [u8]) -> String {
    partial_body_server(declared, sent, Duration::ZERO).await
}

/// Like [`truncated_body_server`] but keeps the connection open for `stall`
/// after the partial body, so a transfer is still in flight.
pub async fn stalling_body_server(
    declared: usize,
    sent: &'static [u8],
    stall: Duration,
) -> String {
    partial_body_server(declared, sent, stall).await
}

async fn partial_body_server(declared: usize, sent: &'static [u8], stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let addr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = vec![0_u8; 4096];
                let _ = socket.read(&mut request).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {declared}\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(sent).await;
                let _ = socket.flush().await;
                tokio::time::sleep(stall).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Polls until `path` exists, panicking after five seconds.
pub async fn wait_for_file(path: &Path) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Fetcher with a fixed status width so log lines are deterministic.
pub fn fetcher(config: PipelineConfig, cache: Arc<CacheStore>) -> Fetcher {
    Fetcher::new(Arc::new(config), HttpClient::new(), cache).with_width_source(|| 80)
}
