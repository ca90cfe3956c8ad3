//! Where repochat stores its own data (config, vector index, repository clones).

use std::path::PathBuf;

const INDEX_FILENAME: &str = "index.json";
const REPOS_DIRNAME: &str = "repos";

/// Returns the directory where repochat stores config, index, and clones.
/// On Linux: `~/.local/share/repochat/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Repochat", "repochat")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// File backing the local vector index.
pub fn index_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join(INDEX_FILENAME))
}

/// Parent directory for repository clones. Created on demand.
pub fn repos_dir() -> Option<PathBuf> {
    let dir = app_data_dir()?.join(REPOS_DIRNAME);
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
