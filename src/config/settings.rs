//! `[settings]` table: run-wide defaults.
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::platform::PlatformContext;
use crate::resources::detect::DetectionMethod;
use crate::resources::{BackupFormat, BackupPolicy, ConflictPolicy, GlobalPolicy};

/// Backup directory used when `[settings] backup_dir` is absent.
pub const DEFAULT_BACKUP_DIR: &str = "~/.converge/backups";

/// Raw `[settings]` values as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Policy for occupied targets.
    pub conflict_policy: ConflictPolicy,
    /// Default backup directory; may contain placeholders.
    pub backup_dir: String,
    /// Probe for installed applications; when off every gate passes.
    pub detection: bool,
    /// Detection methods, in order.
    pub detection_methods: Vec<DetectionMethod>,
    /// Reconcile resources concurrently.
    pub parallel: bool,
    /// Per-resource deadline in seconds.
    pub resource_timeout_secs: Option<u64>,
    /// Backup defaults.
    pub backup: BackupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
            detection: true,
            detection_methods: DetectionMethod::ALL.to_vec(),
            parallel: true,
            resource_timeout_secs: None,
            backup: BackupSettings::default(),
        }
    }
}

impl Settings {
    /// Build the [`GlobalPolicy`] these settings describe.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for an empty method list or a
    /// zero timeout, and [`ConfigError::Path`] when a directory cannot be
    /// expanded.
    pub fn policy(
        &self,
        platform: &PlatformContext,
        dry_run: bool,
    ) -> Result<GlobalPolicy, ConfigError> {
        if self.detection_methods.is_empty() {
            return Err(invalid("detection_methods", "at least one method is required"));
        }
        if self.resource_timeout_secs == Some(0) {
            return Err(invalid("resource_timeout_secs", "must be greater than zero"));
        }

        let backup_dir = platform.expand_path(&self.backup_dir)?;
        let mut policy = GlobalPolicy::new(backup_dir);
        policy.default_conflict_policy = self.conflict_policy;
        policy.backup =
            BackupOverride::from(self.backup.clone()).apply(&BackupPolicy::default(), platform)?;
        policy.detection_methods.clone_from(&self.detection_methods);
        policy.dry_run = dry_run;
        policy.resource_timeout = self.resource_timeout_secs.map(Duration::from_secs);
        Ok(policy)
    }
}

/// `[settings.backup]`: the default backup policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupSettings {
    /// Back up targets before replacing them.
    pub enabled: bool,
    /// Backup directory override.
    pub directory: Option<String>,
    /// Naming scheme for backup files.
    pub format: BackupFormat,
    /// Gzip backups.
    pub compress: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        let policy = BackupPolicy::default();
        Self {
            enabled: policy.enabled,
            directory: None,
            format: policy.format,
            compress: policy.compress,
        }
    }
}

/// Partial backup policy; unset fields inherit from a base policy.
///
/// Used for `[resources.backup]`, where a resource overrides only the keys
/// it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupOverride {
    /// Overrides `enabled`.
    pub enabled: Option<bool>,
    /// Overrides `directory`.
    pub directory: Option<String>,
    /// Overrides `format`.
    pub format: Option<BackupFormat>,
    /// Overrides `compress`.
    pub compress: Option<bool>,
}

impl From<BackupSettings> for BackupOverride {
    fn from(settings: BackupSettings) -> Self {
        Self {
            enabled: Some(settings.enabled),
            directory: settings.directory,
            format: Some(settings.format),
            compress: Some(settings.compress),
        }
    }
}

impl BackupOverride {
    /// Layer these values over `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Path`] when `directory` cannot be expanded.
    pub fn apply(
        &self,
        base: &BackupPolicy,
        platform: &PlatformContext,
    ) -> Result<BackupPolicy, ConfigError> {
        let directory: Option<PathBuf> = match &self.directory {
            Some(raw) => Some(platform.expand_path(raw)?),
            None => base.directory.clone(),
        };
        Ok(BackupPolicy {
            enabled: self.enabled.unwrap_or(base.enabled),
            directory,
            format: self.format.unwrap_or(base.format),
            compress: self.compress.unwrap_or(base.compress),
        })
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
