//! Configuration loading: `converge.toml` into validated value types.
//!
//! The file is parsed once into raw tables ([`Settings`], [`SourceConfig`],
//! [`ResourceEntry`]) and converted at this boundary; the reconciliation
//! core only ever sees [`ManagedResource`] and [`GlobalPolicy`].
pub mod resources;
pub mod settings;
pub mod source;
pub mod toml_loader;
pub mod validation;

use std::path::{Path, PathBuf};

use serde::Deserialize;

pub use self::resources::ResourceEntry;
pub use self::settings::Settings;
pub use self::source::{SourceConfig, SourceLocation};

use crate::error::ConfigError;
use crate::platform::PlatformContext;
use crate::resources::{GlobalPolicy, ManagedResource};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CONVERGE_CONFIG";

/// File name looked up under the platform config directory.
pub const CONFIG_FILE: &str = "converge.toml";

/// Top-level tables of `converge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    settings: Settings,
    source: Option<SourceConfig>,
    resources: Vec<ResourceEntry>,
}

/// A loaded configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path the configuration was read from.
    pub path: PathBuf,
    /// Run-wide settings from `[settings]`.
    pub settings: Settings,
    /// Where resource sources live, from `[source]`.
    pub source: Option<SourceConfig>,
    /// Declared resources, in file order.
    pub entries: Vec<ResourceEntry>,
}

impl Config {
    /// Pick the config file path.
    ///
    /// Precedence: `explicit` (the `--config` flag), then `from_env`
    /// (`CONVERGE_CONFIG`), then `{config}/converge/converge.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no candidate is available.
    pub fn locate(
        explicit: Option<&Path>,
        from_env: Option<PathBuf>,
        platform: &PlatformContext,
    ) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = from_env.filter(|p| !p.as_os_str().is_empty()) {
            return Ok(path);
        }
        platform
            .config_dir()
            .map(|dir| dir.join("converge").join(CONFIG_FILE))
            .ok_or_else(|| {
                ConfigError::NotFound(format!(
                    "no --config given, {CONFIG_ENV} unset and no config directory"
                ))
            })
    }

    /// Load and parse the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is missing, unreadable, or not
    /// valid against the schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml_loader::load_config(path)?;
        Ok(Self::from_file(path, file))
    }

    /// Parse `content` as if read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSyntax`] if `content` is not valid.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml_loader::parse_config(content, path)?;
        Ok(Self::from_file(path, file))
    }

    fn from_file(path: &Path, file: ConfigFile) -> Self {
        Self {
            path: path.to_path_buf(),
            settings: file.settings,
            source: file.source,
            entries: file.resources,
        }
    }

    /// Directory containing the config file.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Where resource sources live.  Without a `[source]` table this is the
    /// config file's directory.
    ///
    /// # Errors
    ///
    /// See [`SourceConfig::location`].
    pub fn source_location(
        &self,
        platform: &PlatformContext,
    ) -> Result<SourceLocation, ConfigError> {
        match &self.source {
            Some(source) => source.location(self.dir(), platform),
            None => Ok(SourceLocation::Local(self.dir().to_path_buf())),
        }
    }

    /// The run-wide policy from `[settings]`.
    ///
    /// # Errors
    ///
    /// See [`Settings::policy`].
    pub fn policy(
        &self,
        platform: &PlatformContext,
        dry_run: bool,
    ) -> Result<GlobalPolicy, ConfigError> {
        self.settings.policy(platform, dry_run)
    }

    /// Convert every `[[resources]]` entry, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::InvalidResource`] encountered.
    pub fn resources(
        &self,
        source_root: &Path,
        policy: &GlobalPolicy,
        platform: &PlatformContext,
    ) -> Result<Vec<ManagedResource>, ConfigError> {
        self.entries
            .iter()
            .cloned()
            .map(|entry| entry.into_resource(source_root, &policy.backup, platform))
            .collect()
    }
}
