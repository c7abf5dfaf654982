//! HTTP client wrapper for fetching files.
//!
//! The client only sets a connect timeout. Transfers have no overall deadline
//! because lecture recordings can take a long time to stream. Every request
//! races against the caller's cancellation token.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{
    CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, IF_NONE_MATCH,
};
use reqwest::{Client, Method, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::constants::CHUNK_SIZE;
use super::error::FetchError;
use super::filename::{
    extension_from_content_type, extension_from_file_name, extension_from_url,
    parse_content_disposition,
};
use super::task::RequestOptions;
use crate::config::DEFAULT_CONNECT_TIMEOUT_SECS;

const USER_AGENT: &str = concat!("sitesync/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by all workers.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with an explicit connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_connect_timeout(connect_timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Sends a GET request, optionally conditional on `if_none_match`.
    ///
    /// Returns the response for any 2xx status and for 304.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Cancelled`] if `cancel` fires before the response arrives
    /// - [`FetchError::Network`] on connection failures
    /// - [`FetchError::HttpStatus`] for any other status
    /// - [`FetchError::InvalidHeader`] if a task header is malformed
    #[instrument(skip(self, options, cancel), fields(url = %url))]
    pub async fn get(
        &self,
        url: &str,
        options: &RequestOptions,
        if_none_match: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, FetchError> {
        let mut headers = build_headers(url, options)?;
        if let Some(etag) = if_none_match {
            let value = HeaderValue::from_str(etag)
                .map_err(|_| FetchError::invalid_header(url, IF_NONE_MATCH.as_str()))?;
            headers.insert(IF_NONE_MATCH, value);
        }

        let response = self.send(Method::GET, url, headers, cancel).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            debug!(status = status.as_u16(), "received response");
            Ok(response)
        } else {
            Err(FetchError::http_status(url, status.as_u16()))
        }
    }

    /// Determines the file extension of the resource behind `url`.
    ///
    /// Sends a HEAD request and looks at, in order: the Content-Disposition
    /// filename, the Content-Type, and the last segment of the final URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Detection`] when the request fails or no extension
    /// can be derived, and [`FetchError::Cancelled`] if `cancel` fires.
    #[instrument(skip(self, options, cancel), fields(url = %url))]
    pub async fn detect_extension(
        &self,
        url: &str,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<String, FetchError> {
        let headers = build_headers(url, options)?;
        let response = match self.send(Method::HEAD, url, headers, cancel).await {
            Ok(response) => response,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => return Err(FetchError::detection(url, e.to_string())),
        };

        if !response.status().is_success() {
            return Err(FetchError::detection(
                url,
                format!("HTTP {}", response.status().as_u16()),
            ));
        }

        let extension = extension_from_response(&response)
            .ok_or_else(|| FetchError::detection(url, "no extension in response headers or URL"))?;
        debug!(%extension, "detected extension");
        Ok(extension)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let request = self.client.request(method, parsed).headers(headers).send();

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::cancelled(url)),
            result = request => result.map_err(|e| FetchError::network(url, e)),
        }
    }
}

fn build_headers(url: &str, options: &RequestOptions) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::with_capacity(options.headers.len() + 1);
    for (name, value) in &options.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| FetchError::invalid_header(url, name))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| FetchError::invalid_header(url, name))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn extension_from_response(response: &reqwest::Response) -> Option<String> {
    let from_disposition = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_disposition)
        .and_then(|name| extension_from_file_name(&name));
    if from_disposition.is_some() {
        return from_disposition;
    }

    let from_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(extension_from_content_type);
    if let Some(ext) = from_type {
        return Some(ext.to_string());
    }

    extension_from_url(response.url())
}

/// Streams the response body into `file` in [`CHUNK_SIZE`] pieces.
///
/// Returns the number of bytes written. The caller owns cleanup of the file
/// when this fails.
///
/// # Errors
///
/// - [`FetchError::Network`] if the body stream breaks
/// - [`FetchError::Io`] if a write or the final flush fails
/// - [`FetchError::Cancelled`] if `cancel` fires between chunks
pub(crate) async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    cancel: &CancellationToken,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FetchError::cancelled(url)),
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;

        for piece in chunk.chunks(CHUNK_SIZE) {
            writer
                .write_all(piece)
                .await
                .map_err(|e| FetchError::io(file_path, e))?;
        }
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;

    Ok(bytes_written)
}
