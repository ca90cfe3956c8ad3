//! Discovering source files in a repository checkout.
//!
//! Whole subtrees under ignored directories (build output, dependency caches,
//! VCS metadata) are never entered. Only files with a supported extension are read.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// File extensions we index, without the leading dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "py", "js", "tsx", "jsx", "ipynb", "java", "cpp", "ts", "go", "rs", "vue", "swift", "c", "h",
];

/// Directory names whose subtrees are skipped entirely.
pub const IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    "dist",
    "build",
    ".git",
    "__pycache__",
    ".next",
    ".vscode",
    "vendor",
];

/// A source file we found: path relative to the repository root and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative path with `/` separators on every platform.
    pub relative_path: String,
    pub content: String,
}

/// A supported file that could not be read as text.
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("not valid UTF-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),
}

/// Result of scanning a repository tree.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
}

/// Scans `root` for supported source files and returns their relative paths and content.
/// Does not follow symlinks into directories (walkdir default).
pub fn scan_repository(root: &Path) -> Result<ScanReport, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let mut report = ScanReport::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || !is_supported(path) {
            continue;
        }
        match read_text(path) {
            Ok(content) => report.files.push(FileRecord {
                relative_path: relative_path(root, path),
                content,
            }),
            Err(reason) => {
                tracing::warn!(file = %path.display(), %reason, "skipping file");
                report.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }
    Ok(report)
}

/// True when the file's extension is in [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

fn is_ignored_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| IGNORED_DIRS.contains(&name))
}

fn read_text(path: &Path) -> Result<String, SkipReason> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8(bytes)?)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}
