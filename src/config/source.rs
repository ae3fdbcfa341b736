//! `[source]` table: where resource sources live.
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::platform::PlatformContext;
use crate::sync::{self, AuthConfig};

/// A local directory or a remote repository holding the resource sources.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Local path or remote URL.
    pub path: String,
    /// Branch to check out for remote sources.
    #[serde(default)]
    pub branch: Option<String>,
    /// Credentials for remote sources.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Where the source tree resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A directory on this machine.
    Local(PathBuf),
    /// A git repository synced into the cache.
    Remote {
        /// Repository URL.
        url: String,
        /// Branch, or the remote default.
        branch: Option<String>,
        /// Checkout directory in the local cache.
        checkout: PathBuf,
    },
}

impl SourceLocation {
    /// Directory resource sources are relative to.
    #[must_use]
    pub fn root(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Remote { checkout, .. } => checkout,
        }
    }
}

impl SourceConfig {
    /// Resolve against the directory holding the config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Path`] when a local path cannot be expanded,
    /// or [`ConfigError::InvalidSetting`] when a remote source needs the
    /// application-support directory and the platform has none.
    pub fn location(
        &self,
        config_dir: &Path,
        platform: &PlatformContext,
    ) -> Result<SourceLocation, ConfigError> {
        if sync::is_remote_url(&self.path) {
            let base = platform
                .app_support_dir()
                .ok_or_else(|| ConfigError::InvalidSetting {
                    key: "source.path".to_string(),
                    reason: "no application support directory to cache the repository in"
                        .to_string(),
                })?;
            return Ok(SourceLocation::Remote {
                url: self.path.clone(),
                branch: self.branch.clone(),
                checkout: sync::cache_path(base, &self.path),
            });
        }
        let root = resolve_local(&self.path, config_dir, platform)?;
        Ok(SourceLocation::Local(root))
    }
}

/// Expand a config-relative path.
///
/// Paths using `~` or a placeholder are expanded by the platform; other
/// relative paths are taken relative to `base`.
///
/// # Errors
///
/// Returns [`ConfigError::Path`] when a placeholder cannot be expanded.
pub fn resolve_local(
    raw: &str,
    base: &Path,
    platform: &PlatformContext,
) -> Result<PathBuf, ConfigError> {
    if raw.starts_with('~') || raw.contains('{') {
        return Ok(platform.expand_path(raw)?);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(base.join(path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::platform::Os;

    fn platform() -> PlatformContext {
        PlatformContext::with_home(Os::Linux, "/home/u")
    }

    fn source(path: &str) -> SourceConfig {
        SourceConfig {
            path: path.to_string(),
            branch: None,
            auth: AuthConfig::default(),
        }
    }

    #[test]
    fn relative_local_path_is_anchored_at_config_dir() {
        let loc = source("dotfiles").location(Path::new("/etc/cv"), &platform()).unwrap();
        assert_eq!(loc, SourceLocation::Local(PathBuf::from("/etc/cv/dotfiles")));
    }

    #[test]
    fn tilde_local_path_is_expanded() {
        let loc = source("~/dotfiles").location(Path::new("/etc/cv"), &platform()).unwrap();
        assert_eq!(loc.root(), Path::new("/home/u/dotfiles"));
    }

    #[test]
    fn remote_url_is_cached_under_app_support() {
        let loc = source("https://example.com/me/dotfiles.git")
            .location(Path::new("/etc/cv"), &platform())
            .unwrap();
        assert!(matches!(&loc, SourceLocation::Remote { url, .. } if url.ends_with("dotfiles.git")));
        assert!(loc.root().starts_with("/home/u/.local/share/converge/repos"));
    }

    #[test]
    fn remote_without_app_support_dir_is_invalid() {
        let mut p = platform();
        p.app_support_dir = None;
        let err = source("git@host:me/d.git")
            .location(Path::new("/etc"), &p)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn auth_table_parses() {
        let cfg: SourceConfig = toml::from_str(
            r#"
path = "https://example.com/r.git"
branch = "main"
[auth]
username = "me"
token = "secret"
"#,
        )
        .unwrap();
        assert_eq!(cfg.branch.as_deref(), Some("main"));
        assert_eq!(cfg.auth.token.as_deref(), Some("secret"));
    }
}
