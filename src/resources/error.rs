//! Typed error variants for the reconciliation pipeline.
//!
//! [`ReconcileError`] is the fatal channel of a single resource
//! reconciliation.  Recoverable conditions (missing application, a skipped
//! conflict, a failed `chmod`) are never represented here; they travel as
//! [`Diagnostic`](super::outcome::Diagnostic) values on the outcome instead.
//!
//! Payloads are plain strings so the error can be cloned into a
//! [`DeploymentOutcome`](super::outcome::DeploymentOutcome) and serialized
//! alongside it.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Fatal errors that abort one resource's pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileError {
    /// The resource declaration is malformed (bad mode string, bad strategy mix, …).
    #[error("invalid resource '{resource}': {reason}")]
    Validation {
        /// Identifier of the offending resource.
        resource: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// The source path is absent at deploy time.
    #[error("source not found: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// The OS denied a write or metadata change.
    #[error("permission denied: {path}: {reason}")]
    Permission {
        /// Path the operation was attempted on.
        path: String,
        /// Underlying OS message.
        reason: String,
    },

    /// The conflict at the target has no safe resolution.
    #[error("conflict at {path}: {reason}")]
    Conflict {
        /// The target path.
        path: String,
        /// Why no decision could be made.
        reason: String,
    },

    /// The pre-mutation snapshot could not be written.
    #[error("backup of {path} failed: {reason}")]
    Backup {
        /// The path that was being backed up.
        path: String,
        /// Underlying failure.
        reason: String,
    },

    /// The template renderer rejected the template.
    #[error("rendering template {template} failed: {reason}")]
    Render {
        /// Path of the template source.
        template: String,
        /// Renderer error message.
        reason: String,
    },

    /// A placeholder referenced a system directory that is unavailable.
    #[error("cannot resolve {placeholder} in '{path}': directory is unavailable")]
    Resolution {
        /// The raw path being resolved.
        path: String,
        /// The placeholder that could not be expanded.
        placeholder: String,
    },

    /// The run was cancelled (or timed out) before a destructive step.
    #[error("cancelled before {step}")]
    Cancelled {
        /// The step that was not started.
        step: String,
    },

    /// Any other I/O failure.
    #[error("{context}: {reason}")]
    Io {
        /// What was being attempted, including the path.
        context: String,
        /// Underlying OS message.
        reason: String,
    },
}

impl ReconcileError {
    /// Classify an I/O error raised while operating on `path`.
    ///
    /// `PermissionDenied` maps to [`ReconcileError::Permission`]; everything
    /// else becomes [`ReconcileError::Io`] with `action` as context.
    #[must_use]
    pub fn from_io(action: &str, path: &Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Permission {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Io {
                context: format!("{action} {}", path.display()),
                reason: err.to_string(),
            }
        }
    }

    /// Shorthand for a [`ReconcileError::Validation`].
    #[must_use]
    pub fn validation(resource: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, matching the serialized `kind` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Permission { .. } => "permission",
            Self::Conflict { .. } => "conflict",
            Self::Backup { .. } => "backup",
            Self::Render { .. } => "render",
            Self::Resolution { .. } => "resolution",
            Self::Cancelled { .. } => "cancelled",
            Self::Io { .. } => "io",
        }
    }
}
