//! Target path expansion.
//!
//! Raw targets may start with `~` and may contain the `{home}`, `{config}`,
//! `{app_support}` and `{app}` placeholders.  A placeholder is looked up only
//! when it appears, so a missing system directory fails resolution only for
//! paths that reference it.

use std::path::{Path, PathBuf};

use super::error::ReconcileError;
use crate::platform::PlatformContext;

/// Placeholder for the home directory.
pub const HOME_TOKEN: &str = "{home}";
/// Placeholder for the configuration directory.
pub const CONFIG_TOKEN: &str = "{config}";
/// Placeholder for the application support directory.
pub const APP_SUPPORT_TOKEN: &str = "{app_support}";
/// Placeholder for the application name.
pub const APP_TOKEN: &str = "{app}";

/// Caller-supplied values for non-directory placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars {
    /// Substituted for `{app}`.
    pub app_name: Option<String>,
}

impl PathVars {
    /// Vars with `{app}` set to `name`.
    #[must_use]
    pub fn app(name: impl Into<String>) -> Self {
        Self {
            app_name: Some(name.into()),
        }
    }
}

/// Expands raw paths against a [`PlatformContext`].
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    platform: &'a PlatformContext,
}

impl<'a> PathResolver<'a> {
    /// Resolver for `platform`.
    #[must_use]
    pub const fn new(platform: &'a PlatformContext) -> Self {
        Self { platform }
    }

    /// Expand `raw` into an absolute path.
    ///
    /// Relative results are anchored at the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Resolution`] when a referenced directory (or
    /// the app name) is unavailable.
    pub fn resolve(&self, raw: &str, vars: &PathVars) -> Result<PathBuf, ReconcileError> {
        let mut expanded = self.expand_tilde(raw)?;

        let directories: [(&str, Option<&Path>); 3] = [
            (HOME_TOKEN, self.platform.home()),
            (CONFIG_TOKEN, self.platform.config_dir()),
            (APP_SUPPORT_TOKEN, self.platform.app_support_dir()),
        ];
        for (token, dir) in directories {
            if expanded.contains(token) {
                let dir = dir.ok_or_else(|| unresolvable(raw, token))?;
                expanded = expanded.replace(token, &dir.to_string_lossy());
            }
        }

        if expanded.contains(APP_TOKEN) {
            let app = vars
                .app_name
                .as_deref()
                .ok_or_else(|| unresolvable(raw, APP_TOKEN))?;
            expanded = expanded.replace(APP_TOKEN, app);
        }

        let path = PathBuf::from(expanded);
        if path.is_absolute() {
            return Ok(path);
        }
        let home = self.platform.home().ok_or_else(|| unresolvable(raw, "~"))?;
        Ok(home.join(path))
    }

    fn expand_tilde(&self, raw: &str) -> Result<String, ReconcileError> {
        let rest = if raw == "~" {
            ""
        } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            rest
        } else {
            return Ok(raw.to_string());
        };
        let home = self.platform.home().ok_or_else(|| unresolvable(raw, "~"))?;
        if rest.is_empty() {
            Ok(home.to_string_lossy().into_owned())
        } else {
            Ok(home.join(rest).to_string_lossy().into_owned())
        }
    }
}

impl PlatformContext {
    /// Expand `raw` with no app name bound.
    ///
    /// # Errors
    ///
    /// See [`PathResolver::resolve`].
    pub fn expand_path(&self, raw: &str) -> Result<PathBuf, ReconcileError> {
        PathResolver::new(self).resolve(raw, &PathVars::default())
    }
}

fn unresolvable(raw: &str, placeholder: &str) -> ReconcileError {
    ReconcileError::Resolution {
        path: raw.to_string(),
        placeholder: placeholder.to_string(),
    }
}
