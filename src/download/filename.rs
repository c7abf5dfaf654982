//! Path and extension helpers for destination files.
//!
//! Extensions are the text after the last `.` of a file name, compared in
//! lowercase. A name without a dot has the empty extension.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use url::Url;

use super::constants::OLD_FILE_SUFFIX;

/// Longest extension accepted from a URL path.
const MAX_URL_EXTENSION_LEN: usize = 10;

/// Resolves a task path against `root` unless it is already absolute.
#[must_use]
pub fn resolve_destination(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Splits a file name into stem and extension at the last dot.
#[must_use]
pub fn split_name_extension(name: &str) -> (&str, &str) {
    name.rsplit_once('.').unwrap_or((name, ""))
}

/// Returns the lowercase extension of a file name.
#[must_use]
pub fn extension_of(name: &str) -> String {
    split_name_extension(name).1.to_lowercase()
}

/// Returns the sibling path a replaced file is moved to: `<stem>-old.<ext>`.
#[must_use]
pub fn old_sibling_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let old_name = match split_name_extension(&name) {
        (stem, "") => format!("{stem}{OLD_FILE_SUFFIX}"),
        (stem, ext) => format!("{stem}{OLD_FILE_SUFFIX}.{ext}"),
    };
    path.with_file_name(old_name)
}

/// Appends `.<extension>` to the final path component.
#[must_use]
pub fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}

/// Maps a `Content-Type` value to a file extension.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let ext = match mime.as_str() {
        "application/pdf" => "pdf",
        "application/zip" | "application/x-zip-compressed" => "zip",
        "application/gzip" => "gz",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "text/html" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        _ => return None,
    };
    Some(ext)
}

/// Extracts the extension of the last URL path segment.
pub(crate) fn extension_from_url(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    extension_from_file_name(last_segment)
}

/// Extracts a usable extension from a server-supplied file name.
///
/// Only short ASCII alphanumeric extensions are accepted, so nothing that
/// could add path components ends up appended to a destination.
pub(crate) fn extension_from_file_name(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_URL_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Parses a Content-Disposition header to extract the filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename*=UTF-8''example%20file.pdf`
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        // charset'language'encoded_value
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();

        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}
