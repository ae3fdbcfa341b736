//! `[[resources]]` entries and their conversion into [`ManagedResource`].
use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::settings::BackupOverride;
use super::source::resolve_local;
use crate::error::ConfigError;
use crate::platform::{Os, PlatformContext};
use crate::resources::chmod::ModeRequest;
use crate::resources::detect::{DetectionMethod, parse_version_lenient};
use crate::resources::error::ReconcileError;
use crate::resources::{
    ApplicationGate, BackupPolicy, ConflictPolicy, ManagedResource, Strategy, Variables,
};

const fn default_true() -> bool {
    true
}

const fn default_strategy() -> Strategy {
    Strategy::Symlink
}

/// One `[[resources]]` table as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    /// Unique resource identifier.
    pub id: String,
    /// Relative to the source root unless absolute.
    pub source: String,
    /// Target path; may contain placeholders.
    pub target: String,
    /// How the target is produced.
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    /// Render the source as a template.
    #[serde(default)]
    pub template: bool,
    /// Template variables.
    #[serde(default)]
    pub vars: Variables,
    /// Per-platform variable overlays.
    #[serde(default)]
    pub platform_vars: BTreeMap<String, Variables>,
    /// Octal mode for files.
    #[serde(default)]
    pub file_mode: Option<String>,
    /// Octal mode for directories.
    #[serde(default)]
    pub dir_mode: Option<String>,
    /// Apply modes to the whole tree.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Overrides the global conflict policy.
    #[serde(default)]
    pub conflict_policy: Option<ConflictPolicy>,
    /// Overrides the global backup settings.
    #[serde(default)]
    pub backup: Option<BackupOverride>,
    /// Application this resource depends on.
    #[serde(default)]
    pub gate: Option<GateEntry>,
}

/// `[resources.gate]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateEntry {
    /// Application name to detect.
    pub application: String,
    /// Lowest accepted version, inclusive.
    #[serde(default)]
    pub min_version: Option<String>,
    /// Highest accepted version, inclusive.
    #[serde(default)]
    pub max_version: Option<String>,
    /// Skip the resource when the application is missing.
    #[serde(default = "default_true")]
    pub skip_if_missing: bool,
    /// Warn and continue when the application is missing.
    #[serde(default)]
    pub warn_if_missing: bool,
    /// Detection methods, in order.
    #[serde(default)]
    pub methods: Option<Vec<DetectionMethod>>,
}

impl ResourceEntry {
    /// Validate this entry and convert it into a [`ManagedResource`].
    ///
    /// Relative sources are joined onto `source_root`; a `[resources.backup]`
    /// table is layered over `default_backup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidResource`] for missing fields, bad mode
    /// strings, bad version bounds, unknown platform keys and contradictory
    /// options.
    pub fn into_resource(
        self,
        source_root: &Path,
        default_backup: &BackupPolicy,
        platform: &PlatformContext,
    ) -> Result<ManagedResource, ConfigError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(invalid(&self.source, "missing id"));
        }
        if self.source.trim().is_empty() {
            return Err(invalid(&id, "missing source"));
        }
        if self.target.trim().is_empty() {
            return Err(invalid(&id, "missing target"));
        }
        if let Some(key) = self.platform_vars.keys().find(|k| Os::from_key(k).is_none()) {
            return Err(invalid(&id, &format!("unknown platform '{key}' in platform_vars")));
        }
        ModeRequest::parse(
            self.file_mode.as_deref(),
            self.dir_mode.as_deref(),
            self.recursive,
        )
        .map_err(|e| invalid(&id, &e.to_string()))?;

        let source = resolve_local(&self.source, source_root, platform)?;
        let backup = self
            .backup
            .map(|over| over.apply(default_backup, platform))
            .transpose()?;
        let gate = self.gate.map(|g| g.into_gate(&id)).transpose()?;

        let resource = ManagedResource {
            id,
            source,
            target: self.target,
            strategy: self.strategy,
            is_template: self.template,
            vars: self.vars,
            platform_vars: self.platform_vars,
            file_mode: self.file_mode,
            dir_mode: self.dir_mode,
            recursive: self.recursive,
            conflict_policy: self.conflict_policy,
            backup,
            gate,
        };
        resource.validate().map_err(|err| match err {
            ReconcileError::Validation { resource, reason } => {
                ConfigError::InvalidResource { resource, reason }
            }
            other => ConfigError::Path(other),
        })?;
        Ok(resource)
    }
}

impl GateEntry {
    fn into_gate(self, id: &str) -> Result<ApplicationGate, ConfigError> {
        if self.application.trim().is_empty() {
            return Err(invalid(id, "gate application is empty"));
        }
        let bound = |raw: Option<String>, key: &str| {
            raw.map(|v| {
                parse_version_lenient(&v)
                    .ok_or_else(|| invalid(id, &format!("{key} '{v}' is not a version")))
            })
            .transpose()
        };
        Ok(ApplicationGate {
            min_version: bound(self.min_version, "min_version")?,
            max_version: bound(self.max_version, "max_version")?,
            application: self.application,
            skip_if_missing: self.skip_if_missing,
            warn_if_missing: self.warn_if_missing,
            methods: self.methods,
        })
    }
}

fn invalid(resource: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidResource {
        resource: resource.to_string(),
        reason: reason.to_string(),
    }
}
