#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};

use crate::util::find_files;

/// Directories that hold build output rather than student code.
const IGNORED_DIRS: [&str; 4] = ["build", ".gradle", ".git", "out"];

/// Source files of a project, keyed by path relative to the project root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBundle {
    /// File contents
    pub files:   BTreeMap<String, String>,
    /// Leading block comment of each file that has one; assignments put
    /// per-file instructions there
    pub context: BTreeMap<String, String>,
}

/// Collects `*.java` files under `src/main/java`, or the whole project when
/// that directory is missing.
pub fn collect_sources(root: &Path) -> Result<SourceBundle> {
    let main_dir = root.join("src").join("main").join("java");
    let search_root = if main_dir.is_dir() { main_dir } else { root.to_path_buf() };

    let mut bundle = SourceBundle::default();
    for path in find_files("java", &search_root)? {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if relative
            .components()
            .any(|c| IGNORED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
        {
            continue;
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let key = relative.to_string_lossy().replace('\\', "/");

        if let Some(header) = header_comment(&text) {
            bundle.context.insert(key.clone(), header);
        }
        bundle.files.insert(key, text);
    }

    Ok(bundle)
}

/// Returns the first `/* ... */` comment if it appears before any code.
pub fn header_comment(source: &str) -> Option<String> {
    let trimmed = source.trim_start();
    let body = trimmed.strip_prefix("/*")?;
    let end = body.find("*/")?;

    let text = body[..end]
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .skip_while(|line| line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim_end().to_string();

    (!text.is_empty()).then_some(text)
}

/// Reads the assignment instructions shipped with a reference solution, if
/// any.
pub fn read_requirements(solution: &Path) -> Option<String> {
    ["README.md", "INSTRUCTIONS.md", "README.txt", "README"]
        .iter()
        .map(|name| solution.join(name))
        .find(|path| path.is_file())
        .and_then(|path| std::fs::read_to_string(path).ok())
        .filter(|text| !text.trim().is_empty())
}
