//! Source repository sync: fetch remote dotfile sources into a local cache.
//!
//! A `[source]` whose `path` is a remote URL is cloned on first use and
//! fast-forwarded on later runs; local paths are used in place.
pub mod auth;
pub mod git;

pub use auth::AuthConfig;
pub use git::GitSync;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SyncError;

/// Hex characters of the URL digest used as the cache directory name.
const CACHE_KEY_LEN: usize = 16;

/// State of a local checkout after a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryInfo {
    /// Checkout directory.
    pub local_path: PathBuf,
    /// Full hex id of the checked-out commit.
    pub last_commit: String,
    /// When the checkout was last updated.
    pub last_update_time: DateTime<Utc>,
}

/// Clones and updates source repositories.
pub trait RepositorySync: Send + Sync + std::fmt::Debug {
    /// Clone `url` into `dest`, checking out `branch` (or the remote default).
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] if the clone fails.
    fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        branch: Option<&str>,
    ) -> Result<RepositoryInfo, SyncError>;

    /// Fast-forward the checkout at `path` to its remote.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Diverged`] when a fast-forward is impossible,
    /// or another [`SyncError`] if fetching fails.
    fn update(&self, path: &Path, branch: Option<&str>) -> Result<RepositoryInfo, SyncError>;
}

/// Clone `url` into `dest` or update the checkout already there.
///
/// # Errors
///
/// Propagates the [`SyncError`] of the underlying operation.
pub fn sync(
    repo: &dyn RepositorySync,
    url: &str,
    dest: &Path,
    branch: Option<&str>,
) -> Result<RepositoryInfo, SyncError> {
    if dest.join(".git").exists() {
        repo.update(dest, branch)
    } else {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SyncError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        repo.clone_repository(url, dest, branch)
    }
}

/// Whether `source` names a remote repository rather than a local path.
///
/// # Examples
///
/// ```
/// use converge::sync::is_remote_url;
///
/// assert!(is_remote_url("https://github.com/me/dotfiles.git"));
/// assert!(is_remote_url("git@github.com:me/dotfiles.git"));
/// assert!(!is_remote_url("~/dotfiles"));
/// assert!(!is_remote_url("C:\\Users\\me\\dotfiles"));
/// ```
#[must_use]
pub fn is_remote_url(source: &str) -> bool {
    const SCHEMES: [&str; 5] = ["https://", "http://", "ssh://", "git://", "file://"];
    if SCHEMES.iter().any(|scheme| source.starts_with(scheme)) {
        return true;
    }
    // scp-like syntax: user@host:path
    source
        .split_once(':')
        .is_some_and(|(head, _)| head.contains('@') && !head.contains('/'))
}

/// Cache directory for `url` beneath `base`.
///
/// The directory name is a digest of the URL so distinct remotes never
/// share a checkout.
#[must_use]
pub fn cache_path(base: &Path, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    let key = hex.get(..CACHE_KEY_LEN).unwrap_or(&hex);
    base.join("converge").join("repos").join(key)
}
