//! Managed-resource model and the idempotent primitives that converge it.
//!
//! Each submodule owns one stage of the pipeline the
//! [`Reconciler`](crate::tasks::reconcile::Reconciler) drives: detection,
//! path expansion, conflict classification, backup, deployment and
//! permission enforcement.
pub mod backup;
pub mod chmod;
pub mod conflict;
pub mod deploy;
pub mod detect;
pub mod error;
pub mod helpers;
pub mod outcome;
pub mod paths;
pub mod symlink;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::detect::DetectionMethod;
use self::error::ReconcileError;

/// How a source is materialized at its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Create a symbolic link pointing at the source.
    Symlink,
    /// Duplicate the source bytes (or tree) at the target.
    Copy,
    /// Render the source through the template engine, then write the result.
    Template,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Symlink => "symlink",
            Self::Copy => "copy",
            Self::Template => "template",
        })
    }
}

/// What to do when something already exists at the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Replace the target.
    Overwrite,
    /// Leave the target alone.
    Skip,
    /// Back up the target, then replace it.
    #[default]
    Backup,
    /// Merge into the existing target.
    Merge,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Overwrite => "overwrite",
            Self::Skip => "skip",
            Self::Backup => "backup",
            Self::Merge => "merge",
        })
    }
}

/// Naming scheme for backup artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupFormat {
    /// A single backup per target, replaced on every run.
    Simple,
    /// A new, uniquely named backup per run.
    #[default]
    Timestamped,
}

/// How pre-existing targets are preserved before they are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupPolicy {
    /// Back up before replacing.
    pub enabled: bool,
    /// Overrides the global backup directory for this resource.
    pub directory: Option<PathBuf>,
    /// Naming scheme.
    pub format: BackupFormat,
    /// Gzip backups.
    pub compress: bool,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            format: BackupFormat::default(),
            compress: false,
        }
    }
}

/// Optional condition tying a resource to an installed application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationGate {
    /// Application to detect.
    pub application: String,
    /// Lowest accepted version, inclusive.
    pub min_version: Option<semver::Version>,
    /// Highest accepted version, inclusive.
    pub max_version: Option<semver::Version>,
    /// Skip the resource when missing.
    pub skip_if_missing: bool,
    /// Warn and continue when missing.
    pub warn_if_missing: bool,
    /// Detection methods for this gate; `None` uses the global order.
    pub methods: Option<Vec<DetectionMethod>>,
}

impl ApplicationGate {
    /// Gate on `application` with no version bounds that skips when missing.
    #[must_use]
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            min_version: None,
            max_version: None,
            skip_if_missing: true,
            warn_if_missing: false,
            methods: None,
        }
    }
}

/// Template variables as declared in configuration.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// One declared unit of convergence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedResource {
    /// Unique identifier.
    pub id: String,
    /// Absolute source path inside the source tree.
    pub source: PathBuf,
    /// Raw target path, placeholders not yet expanded.
    pub target: String,
    /// How the target is produced.
    pub strategy: Strategy,
    /// Render the source as a template.
    pub is_template: bool,
    /// Template variables.
    pub vars: Variables,
    /// Per-platform overlays keyed by `linux`, `macos` or `windows`.
    pub platform_vars: BTreeMap<String, Variables>,
    /// Octal mode for files.
    pub file_mode: Option<String>,
    /// Octal mode for directories.
    pub dir_mode: Option<String>,
    /// Apply modes to the whole tree.
    pub recursive: bool,
    /// Overrides the global conflict policy.
    pub conflict_policy: Option<ConflictPolicy>,
    /// Overrides the global backup policy.
    pub backup: Option<BackupPolicy>,
    /// Application this resource depends on.
    pub gate: Option<ApplicationGate>,
}

impl ManagedResource {
    /// Create a resource with default options.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<PathBuf>,
        target: impl Into<String>,
        strategy: Strategy,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            strategy,
            is_template: false,
            vars: Variables::new(),
            platform_vars: BTreeMap::new(),
            file_mode: None,
            dir_mode: None,
            recursive: true,
            conflict_policy: None,
            backup: None,
            gate: None,
        }
    }

    /// The strategy actually executed.
    ///
    /// A copy marked as a template is rendered.
    #[must_use]
    pub fn effective_strategy(&self) -> Strategy {
        if self.is_template && self.strategy == Strategy::Copy {
            Strategy::Template
        } else {
            self.strategy
        }
    }

    /// Human-readable description of this resource.
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "{} ({} {} -> {})",
            self.id,
            self.effective_strategy(),
            self.source.display(),
            self.target
        )
    }

    /// Reject strategy/option combinations that cannot be executed.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Validation`] when the declaration is
    /// contradictory.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.id.trim().is_empty() {
            return Err(ReconcileError::validation(&self.id, "identifier is empty"));
        }
        if self.target.trim().is_empty() {
            return Err(ReconcileError::validation(&self.id, "target is empty"));
        }
        if self.is_template && self.strategy == Strategy::Symlink {
            return Err(ReconcileError::validation(
                &self.id,
                "a template cannot be deployed as a symlink",
            ));
        }
        if let Some(gate) = &self.gate
            && let (Some(min), Some(max)) = (&gate.min_version, &gate.max_version)
            && min > max
        {
            return Err(ReconcileError::validation(
                &self.id,
                format!("min_version {min} is greater than max_version {max}"),
            ));
        }
        Ok(())
    }
}

/// Run-wide defaults and switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalPolicy {
    /// Policy for resources that set none.
    pub default_conflict_policy: ConflictPolicy,
    /// Backup policy for resources that set none.
    pub backup: BackupPolicy,
    /// Default backup directory when a policy sets none.
    pub backup_dir: PathBuf,
    /// Detection methods, in order.
    pub detection_methods: Vec<DetectionMethod>,
    /// Report without writing.
    pub dry_run: bool,
    /// Per-resource deadline checked before destructive steps.
    pub resource_timeout: Option<Duration>,
}

impl GlobalPolicy {
    /// Defaults rooted at `backup_dir`.
    #[must_use]
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_conflict_policy: ConflictPolicy::default(),
            backup: BackupPolicy::default(),
            backup_dir: backup_dir.into(),
            detection_methods: DetectionMethod::ALL.to_vec(),
            dry_run: false,
            resource_timeout: None,
        }
    }
}

/// State of a resource (file, symlink, directory tree).
///
/// # Examples
///
/// ```
/// use converge::resources::ResourceState;
///
/// let missing = ResourceState::Missing;
/// let correct = ResourceState::Correct;
/// let wrong = ResourceState::Incorrect { current: "/other/path".into() };
/// let invalid = ResourceState::Invalid { reason: "target is the source".into() };
///
/// assert_ne!(missing, correct);
/// assert_eq!(correct, ResourceState::Correct);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Resource does not exist or is not present.
    Missing,
    /// Resource exists and matches the desired state.
    Correct,
    /// Resource exists but does not match the desired state.
    Incorrect {
        /// The current value of the resource.
        current: String,
    },
    /// Resource cannot be applied (e.g., the target is the source itself).
    Invalid {
        /// Reason why the resource cannot be applied.
        reason: String,
    },
}

/// Result of applying a resource change.
///
/// # Examples
///
/// ```
/// use converge::resources::ResourceChange;
///
/// let applied = ResourceChange::Applied;
/// let skipped = ResourceChange::Skipped { reason: "dry run".into() };
///
/// assert_eq!(applied, ResourceChange::Applied);
/// assert_ne!(applied, skipped);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceChange {
    /// Resource was created or updated.
    Applied,
    /// Resource was not touched.
    Skipped {
        /// Reason why the resource was skipped.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn copy_marked_template_renders() {
        let mut r = ManagedResource::new("x", "/src/x", "~/.x", Strategy::Copy);
        assert_eq!(r.effective_strategy(), Strategy::Copy);
        r.is_template = true;
        assert_eq!(r.effective_strategy(), Strategy::Template);
    }

    #[test]
    fn symlinked_template_is_invalid() {
        let mut r = ManagedResource::new("x", "/src/x", "~/.x", Strategy::Symlink);
        r.is_template = true;
        let err = r.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::Validation { .. }));
    }

    #[test]
    fn empty_target_is_invalid() {
        let r = ManagedResource::new("x", "/src/x", "  ", Strategy::Copy);
        assert!(r.validate().is_err());
    }

    #[test]
    fn inverted_version_bounds_are_invalid() {
        let mut r = ManagedResource::new("x", "/src/x", "~/.x", Strategy::Copy);
        let mut gate = ApplicationGate::new("git");
        gate.min_version = Some(semver::Version::new(3, 0, 0));
        gate.max_version = Some(semver::Version::new(2, 0, 0));
        r.gate = Some(gate);
        assert!(r.validate().is_err());
    }

    #[test]
    fn description_mentions_strategy_and_paths() {
        let r = ManagedResource::new("bashrc", "/src/bashrc", "~/.bashrc", Strategy::Symlink);
        let d = r.description();
        assert!(d.contains("bashrc"));
        assert!(d.contains("symlink"));
        assert!(d.contains("~/.bashrc"));
    }

    #[test]
    fn defaults_are_backup_and_timestamped() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::Backup);
        let policy = BackupPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.format, BackupFormat::Timestamped);
        assert!(!policy.compress);
    }
}
