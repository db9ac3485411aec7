//! Candidate file enumeration for analysis passes

use std::path::Path;

use eyre::Result;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Enumeration cap per pass
pub const MAX_FILES_PER_PASS: usize = 100;

/// Source extensions the loops focus on
const SOURCE_EXTENSIONS: [&str; 5] = ["py", "ts", "tsx", "js", "jsx"];

/// Artifact directories skipped during enumeration
const EXCLUDED_DIRS: [&str; 11] = [
    "__pycache__",
    ".git",
    "node_modules",
    ".venv",
    "venv",
    ".tox",
    "dist",
    "build",
    "target",
    ".mypy_cache",
    ".ruff_cache",
];

fn is_excluded(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| EXCLUDED_DIRS.contains(&name) || name.ends_with(".egg-info"))
}

fn is_source_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file()
        && entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Enumerate source files under a root, capped at [`MAX_FILES_PER_PASS`]
///
/// Walks in file-name order for stable prompts across runs.
pub fn enumerate_source_files(root: &Path, cap: usize) -> Result<Vec<String>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e))
    {
        let entry = entry?;
        if is_source_file(&entry) {
            files.push(entry.path().display().to_string());
            if files.len() >= cap {
                break;
            }
        }
    }

    debug!(root = %root.display(), count = files.len(), "enumerate_source_files: done");
    Ok(files)
}
