//! Pipeline configuration.
//!
//! [`PipelineConfig`] is an immutable value handed to the pipeline at
//! construction time. It can be built in code or loaded from a TOML file:
//!
//! ```toml
//! root = "/home/me/courses"
//! forbidden_extensions = ["video"]
//! force_download = true
//! force_download_excluded_hosts = ["polybox.ethz.ch"]
//! keep_replaced_files = true
//! workers = 20
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::DEFAULT_WORKERS;

/// Smallest accepted worker pool size.
pub const MIN_WORKERS: usize = 1;

/// Largest accepted worker pool size.
pub const MAX_WORKERS: usize = 100;

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// File name of the cache database when `cache_db` is not configured.
pub const DEFAULT_CACHE_DB_NAME: &str = ".sitesync-cache.db";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or otherwise unusable.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Settings shared by every worker of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory that relative task paths are resolved against.
    ///
    /// May be left out of a file when it is supplied on the command line;
    /// [`validate`](Self::validate) rejects it if it is still empty.
    #[serde(default)]
    pub root: PathBuf,
    /// Extensions admitted by default. Empty admits everything not forbidden.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    /// Extensions rejected by default.
    #[serde(default)]
    pub forbidden_extensions: Vec<String>,
    /// Re-download existing files even without a checksum change.
    #[serde(default)]
    pub force_download: bool,
    /// Hosts never force-downloaded, usually because they send no `ETag`.
    #[serde(default)]
    pub force_download_excluded_hosts: Vec<String>,
    /// Move a replaced file to `<stem>-old.<ext>` instead of overwriting it.
    #[serde(default)]
    pub keep_replaced_files: bool,
    /// Number of download workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Hosts known to omit `ETag`; no warning is raised for them.
    #[serde(default)]
    pub missing_etag_excluded_hosts: Vec<String>,
    /// Location of the cache database. Defaults to a file inside `root`.
    #[serde(default)]
    pub cache_db: Option<PathBuf>,
    /// HTTP connect timeout. Transfers themselves have no deadline.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl PipelineConfig {
    /// Creates a configuration with defaults for everything except `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allowed_extensions: Vec::new(),
            forbidden_extensions: Vec::new(),
            force_download: false,
            force_download_excluded_hosts: Vec::new(),
            keep_replaced_files: false,
            workers: DEFAULT_WORKERS,
            missing_etag_excluded_hosts: Vec::new(),
            cache_db: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, otherwise the
    /// errors of [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file without validating it.
    ///
    /// Callers that layer overrides on top (e.g. command-line flags) validate
    /// once the final values are in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] for malformed TOML or unknown keys.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(toml::from_str(&raw)?)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "root",
                reason: "is required".to_string(),
            });
        }
        if !self.root.is_absolute() {
            return Err(ConfigError::Invalid {
                field: "root",
                reason: format!("'{}' is not an absolute path", self.root.display()),
            });
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: format!(
                    "{} is outside {MIN_WORKERS}..={MAX_WORKERS}",
                    self.workers
                ),
            });
        }
        if !(1..=3600).contains(&self.connect_timeout_secs) {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_secs",
                reason: format!("{} is outside 1..=3600", self.connect_timeout_secs),
            });
        }
        Ok(())
    }

    /// Returns the cache database location.
    #[must_use]
    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_db
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_CACHE_DB_NAME))
    }

    /// True when `host` opts out of global force downloads.
    #[must_use]
    pub fn is_force_excluded(&self, host: &str) -> bool {
        contains_host(&self.force_download_excluded_hosts, host)
    }

    /// True when a missing `ETag` from `host` is expected.
    #[must_use]
    pub fn is_missing_etag_expected(&self, host: &str) -> bool {
        contains_host(&self.missing_etag_excluded_hosts, host)
    }
}

fn contains_host(hosts: &[String], host: &str) -> bool {
    hosts.iter().any(|candidate| candidate.eq_ignore_ascii_case(host))
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/sitesync/config.toml`
/// 2. `$HOME/.config/sitesync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("sitesync")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("sitesync")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
