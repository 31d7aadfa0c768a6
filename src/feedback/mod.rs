#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Parsing, editing and persisting feedback documents
pub mod document;
/// Markdown rendering of one grading report
pub mod render;

pub use document::{FeedbackDocument, FeedbackEntry, FeedbackStore};
pub use render::MarkdownRenderer;

/// Every entry starts with a line beginning with this prefix, followed by the
/// student's username.
pub const HEADER_PREFIX: &str = "# Grading Report: ";

/// Phrases that mark an entry as recording a missing repository.
pub const MISSING_REPO_SENTINELS: [&str; 2] = ["Repository not found", "Homework not Completed"];

/// Returns the username if `line` is an entry header. Tolerates a trailing
/// `\r`.
pub fn header_username(line: &str) -> Option<&str> {
    line.trim_end_matches(['\n', '\r'])
        .strip_prefix(HEADER_PREFIX)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Whether `text` contains any of [`MISSING_REPO_SENTINELS`].
pub fn mentions_missing_repo(text: &str) -> bool {
    MISSING_REPO_SENTINELS.iter().any(|s| text.contains(s))
}
