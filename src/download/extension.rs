//! Extension-based admission control.
//!
//! A policy merges per-task allow/forbid lists with the global defaults,
//! lower-cases everything and expands the `video` alias. Forbidden wins over
//! allowed, and an empty allow list admits every extension that is not
//! forbidden.

use std::collections::HashSet;

use super::constants::{MOVIE_EXTENSIONS, VIDEO_ALIAS};
use super::filename::extension_of;

/// Merged allow/forbid sets for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionPolicy {
    allowed: HashSet<String>,
    forbidden: HashSet<String>,
}

fn merge<S: AsRef<str>>(task: &[S], global: &[S]) -> HashSet<String> {
    let mut merged: HashSet<String> = task
        .iter()
        .chain(global)
        .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
        .collect();
    if merged.contains(VIDEO_ALIAS) {
        merged.extend(MOVIE_EXTENSIONS.iter().map(|ext| (*ext).to_string()));
    }
    merged
}

impl ExtensionPolicy {
    /// Builds the policy from task overrides and global defaults.
    #[must_use]
    pub fn merged<S: AsRef<str>>(
        task_allowed: &[S],
        task_forbidden: &[S],
        global_allowed: &[S],
        global_forbidden: &[S],
    ) -> Self {
        Self {
            allowed: merge(task_allowed, global_allowed),
            forbidden: merge(task_forbidden, global_forbidden),
        }
    }

    /// Returns true when a file called `file_name` may be downloaded.
    #[must_use]
    pub fn admits(&self, file_name: &str) -> bool {
        let extension = extension_of(file_name);
        if self.forbidden.contains(&extension) {
            return false;
        }
        self.allowed.is_empty() || self.allowed.contains(&extension)
    }

    /// Returns true when `extension` is in the forbidden set.
    #[must_use]
    pub fn forbids(&self, extension: &str) -> bool {
        self.forbidden.contains(&extension.to_lowercase())
    }
}

/// Returns true for extensions covered by the `video` alias.
#[must_use]
pub fn is_movie_extension(extension: &str) -> bool {
    MOVIE_EXTENSIONS
        .iter()
        .any(|movie| movie.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    #[test]
    fn test_empty_policy_admits_everything() {
        let policy = ExtensionPolicy::merged(NONE, NONE, NONE, NONE);
        assert!(policy.admits("slides.pdf"));
        assert!(policy.admits("lecture.mp4"));
        assert!(policy.admits("README"));
    }

    #[test]
    fn test_forbidden_rejects_case_insensitively() {
        let policy = ExtensionPolicy::merged(NONE, &["PDF"], NONE, NONE);
        assert!(!policy.admits("slides.pdf"));
        assert!(!policy.admits("slides.PDF"));
        assert!(policy.admits("slides.zip"));
    }

    #[test]
    fn test_non_empty_allow_list_excludes_others() {
        let policy = ExtensionPolicy::merged(&["pdf"], NONE, &["zip"], NONE);
        assert!(policy.admits("a.pdf"));
        assert!(policy.admits("a.zip"));
        assert!(!policy.admits("a.docx"));
        assert!(!policy.admits("Makefile"));
    }

    #[test]
    fn test_forbidden_takes_precedence_over_allowed() {
        let policy = ExtensionPolicy::merged(&["pdf", "zip"], NONE, NONE, &["zip"]);
        assert!(policy.admits("a.pdf"));
        assert!(!policy.admits("a.zip"));
    }

    #[test]
    fn test_video_alias_expands_in_forbidden_list() {
        let policy = ExtensionPolicy::merged(NONE, NONE, NONE, &["Video"]);
        for ext in MOVIE_EXTENSIONS {
            assert!(!policy.admits(&format!("lecture.{ext}")), "{ext} should be forbidden");
            assert!(policy.forbids(ext));
        }
        assert!(policy.admits("lecture.pdf"));
    }

    #[test]
    fn test_video_alias_expands_in_allowed_list() {
        let policy = ExtensionPolicy::merged(&["video"], NONE, NONE, NONE);
        assert!(policy.admits("recording.mkv"));
        assert!(!policy.admits("slides.pdf"));
    }

    #[test]
    fn test_leading_dot_in_list_is_ignored() {
        let policy = ExtensionPolicy::merged(NONE, &[".exe"], NONE, NONE);
        assert!(!policy.admits("setup.exe"));
    }

    #[test]
    fn test_is_movie_extension() {
        assert!(is_movie_extension("MP4"));
        assert!(!is_movie_extension("pdf"));
    }
}
