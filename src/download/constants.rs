//! Constants for the download module (chunking, extension sets, status line).

/// Size of each body chunk written to disk (8 KiB).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Default number of workers draining the queue.
pub const DEFAULT_WORKERS: usize = 20;

/// Token that expands to [`MOVIE_EXTENSIONS`] in allow/forbid lists.
pub const VIDEO_ALIAS: &str = "video";

/// Extensions covered by the `video` alias.
pub const MOVIE_EXTENSIONS: &[&str] = &["mp4", "webm", "avi", "mkv", "mov", "m4v"];

/// Document formats whose replacements are handed to the replacement hook.
pub const DIFFABLE_EXTENSIONS: &[&str] = &["pdf"];

/// Suffix appended to the stem of a kept replaced file.
pub const OLD_FILE_SUFFIX: &str = "-old";

/// Marker inserted where a status line section was cut.
pub const STATUS_FILLER: &str = "..";

/// Sections are never cut below this many characters (plus the filler).
pub const STATUS_MIN_LENGTH: usize = 10;

/// Margin used for the fetcher's "added/replaced" lines.
pub const STATUS_MARGIN: isize = -8;
