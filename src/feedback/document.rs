#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use super::{header_username, mentions_missing_repo};

/// One student's section of a feedback document, header line included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    /// Username from the header line
    username:        String,
    /// Whether the text records a missing repository
    is_missing_repo: bool,
    /// The section's exact text, up to the next header
    raw_content:     String,
}

impl FeedbackEntry {
    /// Creates an entry, deriving the missing-repository flag from `raw`.
    pub fn new(username: impl Into<String>, raw_content: impl Into<String>) -> Self {
        let raw_content = raw_content.into();
        Self {
            username: username.into(),
            is_missing_repo: mentions_missing_repo(&raw_content),
            raw_content,
        }
    }

    /// Student username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the entry records a missing repository.
    pub fn is_missing_repo(&self) -> bool {
        self.is_missing_repo
    }

    /// Exact text of the section.
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Replaces the text, re-deriving the missing-repository flag.
    fn set_content(&mut self, raw_content: String) {
        self.is_missing_repo = mentions_missing_repo(&raw_content);
        self.raw_content = raw_content;
    }

    /// Makes the entry end in a blank line so a following header is
    /// separated from it.
    fn ensure_separator(&mut self) {
        ensure_blank_line(&mut self.raw_content);
    }
}

/// Appends newlines until `text` ends with a blank line. Empty text is left
/// alone.
fn ensure_blank_line(text: &mut String) {
    if text.is_empty() || text.ends_with("\n\n") || text.ends_with("\n\r\n") {
        return;
    }
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text.push('\n');
}

/// The text written for a freshly rendered report: the report followed by a
/// single blank-line separator.
pub fn entry_block(rendered: &str) -> String {
    format!("{}\n\n", rendered.trim_end_matches(['\n', '\r']))
}

/// A parsed feedback document.
///
/// Concatenating the preamble and every entry's raw text reproduces the file
/// byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackDocument {
    /// Text before the first header
    preamble: String,
    /// Sections in file order
    entries:  Vec<FeedbackEntry>,
}

impl FeedbackDocument {
    /// Splits `text` into a preamble and one entry per header line.
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut current: Option<(String, String)> = None;

        for line in text.split_inclusive('\n') {
            if let Some(username) = header_username(line) {
                if let Some((name, raw)) = current.take() {
                    doc.entries.push(FeedbackEntry::new(name, raw));
                }
                current = Some((username.to_string(), line.to_string()));
            } else {
                match current.as_mut() {
                    Some((_, raw)) => raw.push_str(line),
                    None => doc.preamble.push_str(line),
                }
            }
        }

        if let Some((name, raw)) = current {
            doc.entries.push(FeedbackEntry::new(name, raw));
        }
        doc
    }

    /// Reassembles the document text.
    pub fn serialize(&self) -> String {
        let mut out = self.preamble.clone();
        for entry in &self.entries {
            out.push_str(&entry.raw_content);
        }
        out
    }

    /// Text before the first header.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Sections in file order.
    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    /// Consumes the document, returning its sections.
    pub fn into_entries(self) -> Vec<FeedbackEntry> {
        self.entries
    }

    /// Whether the document has no sections.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the first entry for `username`.
    pub fn position(&self, username: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.username == username)
    }

    /// The first entry for `username`.
    pub fn get(&self, username: &str) -> Option<&FeedbackEntry> {
        self.position(username).map(|idx| &self.entries[idx])
    }

    /// Replaces the entry for `username` in place, or adds it at the end.
    pub fn replace_or_push(&mut self, username: &str, rendered: &str) {
        let block = entry_block(rendered);
        match self.position(username) {
            Some(idx) => self.entries[idx].set_content(block),
            None => {
                match self.entries.last_mut() {
                    Some(last) => last.ensure_separator(),
                    None => ensure_blank_line(&mut self.preamble),
                }
                self.entries.push(FeedbackEntry::new(username, block));
            }
        }
    }
}

/// The feedback files of one output directory.
///
/// Each assignment maps to one file. Which file is decided once per store and
/// remembered, so every write in a run lands in the same place.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    /// Where feedback files live
    output_dir: PathBuf,
    /// Assignment to resolved file path
    resolved:   HashMap<String, PathBuf>,
}

impl FeedbackStore {
    /// Creates a store writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            resolved:   HashMap::new(),
        }
    }

    /// Where feedback files live.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The file holding `assignment`'s feedback.
    ///
    /// Normally `<assignment>_Feedback.md`. If that name is taken by a
    /// non-empty file without any report header, the first
    /// `<assignment>_Feedback_<n>.md` that is free or is itself a feedback
    /// document is used instead.
    pub fn resolve_path(&mut self, assignment: &str) -> Result<PathBuf> {
        if let Some(path) = self.resolved.get(assignment) {
            return Ok(path.clone());
        }

        let mut path = self.output_dir.join(format!("{assignment}_Feedback.md"));
        let mut n = 1u32;
        while is_foreign(&path)? {
            path = self
                .output_dir
                .join(format!("{assignment}_Feedback_{n}.md"));
            n += 1;
        }

        if n > 1 {
            tracing::info!(
                "Existing feedback file for {assignment} is not a grading report, writing to {}",
                path.display()
            );
        }
        self.resolved.insert(assignment.to_string(), path.clone());
        Ok(path)
    }

    /// Parses the current document for `assignment`. A missing file is an
    /// empty document.
    pub fn document(&mut self, assignment: &str) -> Result<FeedbackDocument> {
        let path = self.resolve_path(assignment)?;
        match read_optional(&path)? {
            Some(text) => Ok(FeedbackDocument::parse(&text)),
            None => Ok(FeedbackDocument::default()),
        }
    }

    /// The entries for `assignment`, in file order.
    pub fn read(&mut self, assignment: &str) -> Result<Vec<FeedbackEntry>> {
        Ok(self.document(assignment)?.into_entries())
    }

    /// Adds `rendered` to the end of the document in a single write,
    /// creating the file and directory as needed.
    pub fn append(&mut self, assignment: &str, rendered: &str) -> Result<PathBuf> {
        let path = self.resolve_path(assignment)?;
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Could not create output directory {}", self.output_dir.display())
        })?;

        let needs_newline = match fs::read(&path) {
            Ok(bytes) => !bytes.is_empty() && !bytes.ends_with(b"\n"),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read {}", path.display()));
            }
        };

        let mut block = String::new();
        if needs_newline {
            block.push('\n');
        }
        block.push_str(&entry_block(rendered));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Could not open {}", path.display()))?;
        file.write_all(block.as_bytes())
            .with_context(|| format!("Could not write to {}", path.display()))?;

        Ok(path)
    }

    /// Replaces `username`'s entry with `rendered`, keeping its position and
    /// every other entry byte for byte. Appends when the file or the entry
    /// does not exist yet.
    pub fn replace(&mut self, assignment: &str, username: &str, rendered: &str) -> Result<PathBuf> {
        let path = self.resolve_path(assignment)?;
        let Some(text) = read_optional(&path)? else {
            return self.append(assignment, rendered);
        };

        let mut doc = FeedbackDocument::parse(&text);
        doc.replace_or_push(username, rendered);
        write_atomic(&path, &doc.serialize())?;
        Ok(path)
    }

    /// Whether `entry` records a missing repository.
    pub fn is_missing_repo_entry(entry: &FeedbackEntry) -> bool {
        entry.is_missing_repo()
    }
}

/// Reads a file, treating absence as `None`.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Could not read {}", path.display())),
    }
}

/// A file is foreign when it has content but no report header. Bytes that
/// are not UTF-8 were never written by the store, so they are foreign too.
fn is_foreign(path: &Path) -> Result<bool> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("Could not read {}", path.display())),
    };
    Ok(match String::from_utf8(bytes) {
        Err(_) => true,
        Ok(text) => {
            !text.trim().is_empty() && !text.split_inclusive('\n').any(|l| header_username(l).is_some())
        }
    })
}

/// Writes through a sibling temp file and a rename, so readers never observe
/// a half-written document.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "feedback.md".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, contents).with_context(|| format!("Could not write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!("Could not move {} over {}", tmp.display(), path.display())
    })?;
    Ok(())
}
