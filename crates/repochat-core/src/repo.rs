//! Repository acquisition: turn a user-supplied location into a local checkout.
//!
//! Remote repositories are shallow-cloned with the `git` binary and kept under a
//! clone root so later runs can refresh instead of re-cloning. Local directories
//! are used in place.

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use url::Url;

use crate::files::ScanError;

const GITHUB: &str = "https://github.com";

/// Where a repository lives, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLocation {
    /// A git URL without trailing `/` or `.git`.
    Remote { url: String, slug: String },
    /// An existing directory, canonicalised.
    Local(PathBuf),
}

impl RepoLocation {
    /// Accepts a local directory, an `http(s)://` or `git@host:` URL, or `owner/name`
    /// shorthand for GitHub.
    pub fn parse(input: &str) -> Result<Self, RepoError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RepoError::InvalidLocation(input.to_string()));
        }
        let as_path = Path::new(input);
        if as_path.is_dir() {
            let path = as_path.canonicalize().map_err(RepoError::Io)?;
            return Ok(Self::Local(path));
        }
        let url = if input.starts_with("https://") || input.starts_with("http://") {
            input.to_string()
        } else if let Some(rest) = input.strip_prefix("git@") {
            return Self::remote_scp(input, rest);
        } else if is_shorthand(input) {
            format!("{GITHUB}/{}", input.trim_end_matches('/'))
        } else {
            return Err(RepoError::InvalidLocation(input.to_string()));
        };
        let url = trim_repo_suffix(&url).to_string();
        let parsed = Url::parse(&url).map_err(|_| RepoError::InvalidLocation(input.to_string()))?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}_{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(RepoError::InvalidLocation(input.to_string())),
        };
        let slug = slug_from(input, &host, &segments)?;
        Ok(Self::Remote { url, slug })
    }

    fn remote_scp(input: &str, rest: &str) -> Result<Self, RepoError> {
        let (host, path) = rest
            .split_once(':')
            .ok_or_else(|| RepoError::InvalidLocation(input.to_string()))?;
        let segments: Vec<&str> = trim_repo_suffix(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self::Remote {
            url: trim_repo_suffix(input).to_string(),
            slug: slug_from(input, host, &segments)?,
        })
    }

    /// The namespace this repository is indexed under.
    pub fn namespace(&self) -> String {
        match self {
            Self::Remote { url, .. } => url.clone(),
            Self::Local(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl std::fmt::Display for RepoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.namespace())
    }
}

fn is_shorthand(input: &str) -> bool {
    let parts: Vec<&str> = input.trim_end_matches('/').split('/').collect();
    parts.len() == 2
        && parts.iter().all(|p| {
            !p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
}

fn trim_repo_suffix(s: &str) -> &str {
    let s = s.trim_end_matches('/');
    s.strip_suffix(".git").unwrap_or(s)
}

/// `host__owner__name`: the host and every path segment, so repositories with the
/// same name on different hosts or groups get different checkouts. Always a single
/// directory name under the clone root.
fn slug_from(input: &str, host: &str, segments: &[&str]) -> Result<String, RepoError> {
    let valid = |part: &str| {
        !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
    };
    if segments.is_empty() || !valid(host) || !segments.iter().all(|s| valid(s)) {
        return Err(RepoError::InvalidLocation(input.to_string()));
    }
    let mut slug = host.to_string();
    for segment in segments {
        slug.push_str("__");
        slug.push_str(segment);
    }
    Ok(slug)
}

/// Produces a local file tree for a repository location.
pub trait RepositorySource: Send + Sync {
    fn fetch(
        &self,
        location: &RepoLocation,
    ) -> impl Future<Output = Result<PathBuf, RepoError>> + Send;
}

/// Clones remote repositories with `git` under `clone_root`.
#[derive(Debug, Clone)]
pub struct GitSource {
    clone_root: PathBuf,
}

impl GitSource {
    pub fn new(clone_root: impl Into<PathBuf>) -> Self {
        Self {
            clone_root: clone_root.into(),
        }
    }

    /// Where a remote repository is (or will be) checked out.
    pub fn checkout_dir(&self, slug: &str) -> PathBuf {
        self.clone_root.join(slug)
    }
}

impl RepositorySource for GitSource {
    async fn fetch(&self, location: &RepoLocation) -> Result<PathBuf, RepoError> {
        match location {
            RepoLocation::Local(path) => {
                if path.is_dir() {
                    Ok(path.clone())
                } else {
                    Err(RepoError::NotFound(path.clone()))
                }
            }
            RepoLocation::Remote { url, slug } => {
                let dest = self.checkout_dir(slug);
                let dest_arg = dest.to_string_lossy().into_owned();
                if dest.join(".git").is_dir() {
                    match run_git(&["-C", &dest_arg, "pull", "--ff-only"]).await {
                        Ok(()) => tracing::info!(%url, dir = %dest.display(), "refreshed clone"),
                        Err(e) => {
                            tracing::warn!(%url, error = %e, "refresh failed, using existing clone")
                        }
                    }
                    return Ok(dest);
                }
                tokio::fs::create_dir_all(&self.clone_root).await?;
                tracing::info!(%url, dir = %dest.display(), "cloning repository");
                run_git(&["clone", "--depth", "1", url.as_str(), &dest_arg]).await?;
                Ok(dest)
            }
        }
    }
}

async fn run_git(args: &[&str]) -> Result<(), RepoError> {
    let output = Command::new("git")
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .await
        .map_err(RepoError::Spawn)?;
    if output.status.success() {
        return Ok(());
    }
    Err(RepoError::Git {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository location: {0:?}")]
    InvalidLocation(String),
    #[error("directory not found: {0}")]
    NotFound(PathBuf),
    #[error("could not run git: {0}")]
    Spawn(std::io::Error),
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(input: &str) -> (String, String) {
        match RepoLocation::parse(input).unwrap() {
            RepoLocation::Remote { url, slug } => (url, slug),
            other => panic!("expected remote, got {other:?}"),
        }
    }

    #[test]
    fn shorthand_expands_to_github() {
        let (url, slug) = remote("rust-lang/regex");
        assert_eq!(url, "https://github.com/rust-lang/regex");
        assert_eq!(slug, "github.com__rust-lang__regex");
    }

    #[test]
    fn urls_are_normalised() {
        let (url, slug) = remote("https://github.com/tokio-rs/tokio.git/");
        assert_eq!(url, "https://github.com/tokio-rs/tokio");
        assert_eq!(slug, "github.com__tokio-rs__tokio");
        assert_eq!(
            RepoLocation::parse("https://github.com/tokio-rs/tokio").unwrap(),
            RepoLocation::parse("tokio-rs/tokio").unwrap()
        );
    }

    #[test]
    fn scp_style_urls_are_accepted() {
        let (url, slug) = remote("git@github.com:serde-rs/serde.git");
        assert_eq!(url, "git@github.com:serde-rs/serde");
        assert_eq!(slug, "github.com__serde-rs__serde");
    }

    #[test]
    fn same_name_on_different_hosts_gets_different_checkouts() {
        let source = GitSource::new("/clones");
        let dirs: Vec<PathBuf> = [
            "https://github.com/acme/tool",
            "https://gitlab.com/acme/tool",
            "https://gitlab.com/group/acme/tool",
            "https://git.example.com:8443/acme/tool",
            "git@bitbucket.org:acme/tool.git",
        ]
        .iter()
        .map(|input| source.checkout_dir(&remote(input).1))
        .collect();
        for (i, a) in dirs.iter().enumerate() {
            assert_eq!(a.parent(), Some(Path::new("/clones")), "{a:?}");
            for b in &dirs[i + 1..] {
                assert_ne!(a, b);
            }
        }
        // https and scp forms of one repository share a checkout.
        let scp = source.checkout_dir(&remote("git@github.com:acme/tool.git").1);
        assert_eq!(scp, dirs[0]);
    }

    #[test]
    fn dot_segments_cannot_escape_the_clone_root() {
        for input in ["git@h:..", "git@h:.", "git@h:acme/..", "git@..:acme/tool", "git@:acme/tool"] {
            assert!(
                matches!(RepoLocation::parse(input), Err(RepoError::InvalidLocation(_))),
                "{input:?}"
            );
        }
    }

    #[test]
    fn rejects_garbage() {
        for input in ["", "   ", "not a repo", "a/b/c", "https://github.com/"] {
            assert!(
                matches!(RepoLocation::parse(input), Err(RepoError::InvalidLocation(_))),
                "{input:?}"
            );
        }
    }

    #[test]
    fn local_directory_is_its_own_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let loc = RepoLocation::parse(dir.path().to_str().unwrap()).unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(loc, RepoLocation::Local(canonical.clone()));
        assert_eq!(loc.namespace(), canonical.to_string_lossy());
    }

    #[tokio::test]
    async fn fetch_local_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let loc = RepoLocation::parse(dir.path().to_str().unwrap()).unwrap();
        let source = GitSource::new(dir.path().join("clones"));
        let root = source.fetch(&loc).await.unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn fetch_vanished_local_dir_fails() {
        let source = GitSource::new("/tmp/unused");
        let loc = RepoLocation::Local(PathBuf::from("/definitely/not/here"));
        assert!(matches!(source.fetch(&loc).await, Err(RepoError::NotFound(_))));
    }
}
