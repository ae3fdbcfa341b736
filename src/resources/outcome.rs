//! Per-resource result records.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::backup::BackupRecord;
use super::conflict::ConflictDecision;
use super::detect::DetectionResult;
use super::error::ReconcileError;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Info,
    /// Something degraded.
    Warning,
    /// Something failed.
    Error,
}

/// A message attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// How serious.
    pub severity: Severity,
    /// What happened.
    pub message: String,
}

impl Diagnostic {
    /// An informational diagnostic.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    /// A warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// An error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            Severity::Info => write!(f, "{}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
            Severity::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Pipeline phases of a single reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started.
    Pending,
    /// Probing for the gating application.
    Detecting,
    /// Left alone.
    Skipped,
    /// Gate failed; continuing with a warning.
    GatedWarn,
    /// Gate passed.
    Continuing,
    /// Inspecting the target.
    ResolvingConflict,
    /// Backing up the target.
    BackingUp,
    /// Writing the target.
    Deploying,
    /// Applying modes.
    SettingPermissions,
    /// Finished.
    Done,
    /// Stopped by an error.
    Failed,
}

/// Terminal record of one resource's reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentOutcome {
    /// Resource identifier.
    pub resource_id: String,
    /// No error occurred.
    pub success: bool,
    /// A gate or policy left the target alone.
    pub skipped: bool,
    /// `true` when the filesystem was modified; always `false` in a dry run.
    pub changed: bool,
    /// Resolved target path.
    pub applied_path: Option<PathBuf>,
    /// Mode of the target afterwards.
    pub applied_mode: Option<String>,
    /// Every phase entered, in order.
    pub trace: Vec<Phase>,
    /// Detection result for gated resources.
    pub detection: Option<DetectionResult>,
    /// Conflict decision, if a target existed.
    pub decision: Option<ConflictDecision>,
    /// Backup taken, if any.
    pub backup: Option<BackupRecord>,
    /// Non-fatal problems.
    pub diagnostics: Vec<Diagnostic>,
    /// The error that stopped reconciliation.
    pub failure: Option<ReconcileError>,
}

impl DeploymentOutcome {
    /// An outcome that has not entered any phase yet.
    #[must_use]
    pub fn pending(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            success: false,
            skipped: false,
            changed: false,
            applied_path: None,
            applied_mode: None,
            trace: vec![Phase::Pending],
            detection: None,
            decision: None,
            backup: None,
            diagnostics: Vec::new(),
            failure: None,
        }
    }

    /// The phase the pipeline ended in.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.trace.last().copied().unwrap_or(Phase::Pending)
    }

    /// Whether the pipeline passed through `phase`.
    #[must_use]
    pub fn visited(&self, phase: Phase) -> bool {
        self.trace.contains(&phase)
    }

    /// Warning and error diagnostics.
    pub fn problems(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity >= Severity::Warning)
    }
}
