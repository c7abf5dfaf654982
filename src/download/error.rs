//! Error types for the download module.
//!
//! Every variant carries the URL or path it concerns so a single
//! `Observer::error` message is enough to understand what failed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;

/// Errors that can occur while fetching one task.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS, reset mid-body).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status other than 304.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error (create directory, rename, create file, write).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Extension detection could not determine a file extension.
    #[error("could not determine extension of {url}: {reason}")]
    Detection {
        /// The requested URL.
        url: String,
        /// Why detection failed.
        reason: String,
    },

    /// The task URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A request header from the task options is not valid HTTP.
    #[error("invalid request header '{name}' for {url}")]
    InvalidHeader {
        /// The URL the header was meant for.
        url: String,
        /// The offending header name.
        name: String,
    },

    /// Reading or writing the validation cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The pipeline was stopped while this task was in flight.
    #[error("cancelled while downloading {url}")]
    Cancelled {
        /// The URL being processed.
        url: String,
    },

    /// Anything else, including a panic inside the fetcher.
    #[error("unexpected error: {message}")]
    Unexpected {
        /// Description of the failure.
        message: String,
    },
}

/// Coarse classification used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Connection failures and bad statuses.
    Transport,
    /// Local disk failures.
    Filesystem,
    /// Extension detection failures.
    Detection,
    /// Cache database failures.
    Cache,
    /// Cooperative shutdown.
    Cancelled,
    /// Catch-all.
    Unexpected,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transport => "transport",
            Self::Filesystem => "filesystem",
            Self::Detection => "detection",
            Self::Cache => "cache",
            Self::Cancelled => "cancelled",
            Self::Unexpected => "unexpected",
        };
        write!(f, "{label}")
    }
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an extension detection error.
    pub fn detection(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Detection {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self::InvalidHeader {
            url: url.into(),
            name: name.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Creates a catch-all error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network { .. }
            | Self::HttpStatus { .. }
            | Self::InvalidUrl { .. }
            | Self::InvalidHeader { .. } => FetchErrorKind::Transport,
            Self::Io { .. } => FetchErrorKind::Filesystem,
            Self::Detection { .. } => FetchErrorKind::Detection,
            Self::Cache(_) => FetchErrorKind::Cache,
            Self::Cancelled { .. } => FetchErrorKind::Cancelled,
            Self::Unexpected { .. } => FetchErrorKind::Unexpected,
        }
    }

    /// True for the shutdown signal, which workers must not swallow.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
