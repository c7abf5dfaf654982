//! Resolves one [`DownloadTask`] end to end.
//!
//! For each task the fetcher decides whether the destination needs to be
//! (re)downloaded, performs a conditional GET when it already exists, streams
//! the body to disk, updates the validation cache and reports through the
//! task's observer.
//!
//! # Decision table
//!
//! | destination | forced | extension admitted | result |
//! |---|---|---|---|
//! | missing | any | yes | [`Action::New`] |
//! | exists | no | any | [`Action::Skip`] (no request) |
//! | exists | yes | yes | [`Action::Replace`] or [`Action::NotModified`] on 304 |
//! | any | any | no | [`Action::Skip`] (no request) |
//!
//! A task is forced when its checksum differs from the cached one, or, for
//! tasks without a checksum, when global force downloads are on and the host
//! is not excluded.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ETAG;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, stream_to_file};
use super::constants::{DIFFABLE_EXTENSIONS, STATUS_MARGIN};
use super::error::FetchError;
use super::extension::{ExtensionPolicy, is_movie_extension};
use super::filename::{append_extension, extension_of, old_sibling_path, resolve_destination};
use super::status::{Cut, FitOptions, Section, fit_sections, terminal_width};
use super::task::DownloadTask;
use crate::cache::CacheRepository;
use crate::config::PipelineConfig;

/// What the fetcher did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The destination did not exist and was written.
    New,
    /// The destination existed and was overwritten.
    Replace,
    /// Nothing to do: up to date, or the extension is not admitted.
    Skip,
    /// The server answered 304 to the conditional request.
    NotModified,
}

/// Post-processing for replaced documents (e.g. highlighting what changed).
///
/// Called only when replaced files are kept, with the new file and the kept
/// previous version. The cache already describes the new file by then, so a
/// failing hook does not cause the file to be fetched again.
#[async_trait]
pub trait ReplacementHook: Send + Sync {
    /// Handles a replaced document.
    async fn on_replaced(
        &self,
        new_path: &Path,
        old_path: &Path,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Removes a destination file on drop unless the write was committed.
///
/// Covers every way out of a write: error returns, cancellation, and the
/// enclosing future being dropped mid-transfer.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove partial file"),
        }
    }
}

/// Performs the per-task download work.
#[derive(Clone)]
pub struct Fetcher {
    config: Arc<PipelineConfig>,
    client: HttpClient,
    cache: Arc<dyn CacheRepository>,
    replacement_hook: Option<Arc<dyn ReplacementHook>>,
    width_source: fn() -> usize,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .field("client", &self.client)
            .field("has_replacement_hook", &self.replacement_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(
        config: Arc<PipelineConfig>,
        client: HttpClient,
        cache: Arc<dyn CacheRepository>,
    ) -> Self {
        Self {
            config,
            client,
            cache,
            replacement_hook: None,
            width_source: terminal_width,
        }
    }

    /// Installs post-processing for replaced documents.
    #[must_use]
    pub fn with_replacement_hook(mut self, hook: Arc<dyn ReplacementHook>) -> Self {
        self.replacement_hook = Some(hook);
        self
    }

    /// Overrides how the terminal width is looked up for status lines.
    #[must_use]
    pub fn with_width_source(mut self, width_source: fn() -> usize) -> Self {
        self.width_source = width_source;
        self
    }

    /// Returns the configuration this fetcher was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes one task.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] for transport, filesystem, extension detection and cache
    /// failures, and [`FetchError::Cancelled`] when `cancel` fires mid-task.
    /// On any error after the destination was opened, the partially written
    /// file has been removed by the time this returns.
    #[instrument(skip(self, task, cancel), fields(key = %task.key, url = %task.url))]
    pub async fn fetch(
        &self,
        task: &DownloadTask,
        cancel: &CancellationToken,
    ) -> Result<Action, FetchError> {
        let policy = ExtensionPolicy::merged(
            task.allowed_extensions.as_slice(),
            task.forbidden_extensions.as_slice(),
            self.config.allowed_extensions.as_slice(),
            self.config.forbidden_extensions.as_slice(),
        );

        let url = Url::parse(&task.url).map_err(|_| FetchError::invalid_url(&task.url))?;
        let host = url.host_str().unwrap_or_default();

        let mut destination = resolve_destination(&self.config.root, &task.path);
        if !task.with_extension {
            let extension = self
                .client
                .detect_extension(&task.url, &task.options, cancel)
                .await?;
            destination = append_extension(&destination, &extension);
        }

        let record = self.cache.get(&destination).await?.unwrap_or_default();
        let exists = tokio::fs::try_exists(&destination)
            .await
            .map_err(|e| FetchError::io(&destination, e))?;

        let force = match &task.checksum {
            Some(checksum) => record.checksum.as_deref() != Some(checksum.as_str()),
            None => self.config.force_download && !self.config.is_force_excluded(host),
        };

        if exists && !force {
            debug!(path = %destination.display(), "destination up to date, skipping");
            return Ok(Action::Skip);
        }

        let if_none_match = if exists { record.etag.as_deref() } else { None };

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = extension_of(&file_name);
        if !policy.admits(&file_name) {
            debug!(%file_name, %extension, "extension not admitted, skipping");
            return Ok(Action::Skip);
        }

        let response = self
            .client
            .get(&task.url, &task.options, if_none_match, cancel)
            .await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            debug!(path = %destination.display(), "not modified");
            return Ok(Action::NotModified);
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if is_movie_extension(&extension) {
            info!("Starting to download {file_name}");
        }

        let directory = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| FetchError::io(&directory, e))?;

        let old_path = if exists && self.config.keep_replaced_files {
            let old_path = old_sibling_path(&destination);
            tokio::fs::rename(&destination, &old_path)
                .await
                .map_err(|e| FetchError::io(&old_path, e))?;
            debug!(old = %old_path.display(), "kept replaced file");
            Some(old_path)
        } else {
            None
        };

        let file = tokio::fs::File::create(&destination)
            .await
            .map_err(|e| FetchError::io(&destination, e))?;
        let guard = PartialFile::new(&destination);
        let bytes = stream_to_file(file, response, &task.url, &destination, cancel).await?;
        guard.commit();
        debug!(bytes, path = %destination.display(), "wrote file");

        match etag {
            Some(etag) => self.cache.save_etag(&destination, &etag).await?,
            None if !self.config.is_missing_etag_expected(host) => {
                warn!(url = %task.url, "response had no etag and host is not excluded");
                task.observer.warning(
                    &task.key,
                    Some(&format!(
                        "url: {} had no etag and is not in the exclusion list",
                        task.url
                    )),
                );
            }
            None => {}
        }
        self.cache
            .save_checksum(&destination, task.checksum.as_deref())
            .await?;

        if let (Some(old_path), Some(hook)) = (&old_path, &self.replacement_hook)
            && DIFFABLE_EXTENSIONS.contains(&extension.as_str())
        {
            debug!("running replacement hook");
            hook.on_replaced(&destination, old_path)
                .await
                .map_err(|e| FetchError::unexpected(format!("replacement hook failed: {e}")))?;
        }

        let verb = if exists { "Replaced" } else { "Added new" };
        let sections = [
            Section::new(format!("{verb} file: '{{}}'"), file_name, 100, Cut::Back),
            Section::new(
                " in '{}'",
                directory.display().to_string(),
                -100,
                Cut::Front,
            ),
        ];
        let line = fit_sections(
            &sections,
            (self.width_source)(),
            FitOptions {
                margin: STATUS_MARGIN,
                ..FitOptions::default()
            },
        );
        info!("{line}");

        if exists {
            task.observer
                .replaced_file(&task.key, &destination, old_path.as_deref());
        } else {
            task.observer.added_new_file(&task.key, &destination);
        }
        task.observer.success(&task.key, Some(&line));

        Ok(if exists { Action::Replace } else { Action::New })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_removed_on_drop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("partial.bin");
        std::fs::write(&path, b"half").unwrap();

        drop(PartialFile::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_partial_file_kept_after_commit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("done.bin");
        std::fs::write(&path, b"all").unwrap();

        PartialFile::new(&path).commit();
        assert!(path.exists());
    }

    #[test]
    fn test_partial_file_missing_is_fine() {
        let temp_dir = tempfile::tempdir().unwrap();
        drop(PartialFile::new(&temp_dir.path().join("never-created")));
    }
}
