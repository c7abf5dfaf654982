//! The unit of work producers put on the queue.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::observer::{Observer, ObserverHandle};

fn default_with_extension() -> bool {
    true
}

/// Extra request settings applied to every request of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestOptions {
    /// Headers sent with the HEAD and the GET.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// One file to fetch.
///
/// Tasks deserialize from JSON so manifests written by crawlers can be fed
/// directly into the queue:
///
/// ```json
/// {"key": "analysis/w1", "path": "Analysis/Week 1/sheet.pdf", "url": "https://example.com/f/1", "checksum": "1709290000"}
/// ```
///
/// The observer is never part of the JSON; producers attach it with
/// [`with_observer`](Self::with_observer).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadTask {
    /// Unique key reported back through the observer.
    pub key: String,
    /// Destination path, relative to the configured root or absolute.
    pub path: PathBuf,
    /// Source URL.
    pub url: String,
    /// False when `path` still lacks its extension and it has to be detected with a HEAD request.
    #[serde(default = "default_with_extension")]
    pub with_extension: bool,
    /// Extra request settings.
    #[serde(default)]
    pub options: RequestOptions,
    /// Extensions admitted for this task in addition to the global list.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    /// Extensions rejected for this task in addition to the global list.
    #[serde(default)]
    pub forbidden_extensions: Vec<String>,
    /// Producer-supplied fingerprint (timestamp, hash, ...) of the remote content.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Where notifications for this task go.
    #[serde(skip)]
    pub observer: ObserverHandle,
}

impl DownloadTask {
    /// Creates a task with defaults for every optional field.
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            url: url.into(),
            with_extension: true,
            options: RequestOptions::default(),
            allowed_extensions: Vec::new(),
            forbidden_extensions: Vec::new(),
            checksum: None,
            observer: ObserverHandle::none(),
        }
    }

    /// Marks the path as lacking its extension.
    #[must_use]
    pub fn without_extension(mut self) -> Self {
        self.with_extension = false;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(name.into(), value.into());
        self
    }

    /// Sets per-task allowed extensions.
    #[must_use]
    pub fn with_allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets per-task forbidden extensions.
    #[must_use]
    pub fn with_forbidden_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the content fingerprint.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Attaches an observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = ObserverHandle::new(observer);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let task = DownloadTask::new("k1", "a/b.pdf", "https://example.com/b.pdf");
        assert!(task.with_extension);
        assert!(task.options.headers.is_empty());
        assert!(task.checksum.is_none());
        assert!(!task.observer.is_attached());
    }

    #[test]
    fn test_builder_methods() {
        let task = DownloadTask::new("k1", "a/b", "https://example.com/b")
            .without_extension()
            .with_header("Cookie", "MoodleSession=abc")
            .with_allowed_extensions(["pdf"])
            .with_forbidden_extensions(vec!["video".to_string()])
            .with_checksum("1700000000");

        assert!(!task.with_extension);
        assert_eq!(
            task.options.headers.get("Cookie").map(String::as_str),
            Some("MoodleSession=abc")
        );
        assert_eq!(task.allowed_extensions, vec!["pdf"]);
        assert_eq!(task.forbidden_extensions, vec!["video"]);
        assert_eq!(task.checksum.as_deref(), Some("1700000000"));
    }

    #[test]
    fn test_deserialize_minimal_json() {
        let task: DownloadTask = serde_json::from_str(
            r#"{"key": "k", "path": "x/y.pdf", "url": "https://example.com/y.pdf"}"#,
        )
        .unwrap();
        assert_eq!(task.key, "k");
        assert_eq!(task.path, PathBuf::from("x/y.pdf"));
        assert!(task.with_extension);
    }

    #[test]
    fn test_deserialize_full_json() {
        let task: DownloadTask = serde_json::from_str(
            r#"{
                "key": "k",
                "path": "x/y",
                "url": "https://example.com/y",
                "with_extension": false,
                "options": {"headers": {"Authorization": "Bearer t"}},
                "allowed_extensions": ["pdf"],
                "forbidden_extensions": ["zip"],
                "checksum": "abc"
            }"#,
        )
        .unwrap();
        assert!(!task.with_extension);
        assert_eq!(task.options.headers.len(), 1);
        assert_eq!(task.forbidden_extensions, vec!["zip"]);
        assert_eq!(task.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_deserialize_rejects_unknown_field() {
        let result: Result<DownloadTask, _> = serde_json::from_str(
            r#"{"key": "k", "path": "p", "url": "u", "kwargs": {}}"#,
        );
        assert!(result.is_err());
    }
}
