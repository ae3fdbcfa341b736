//! Conflict classification.
//!
//! [`inspect`] classifies what currently occupies a target without following
//! symlinks.  [`decide`] maps `(policy, state, strategy)` to a
//! [`ConflictDecision`]; it is a pure function so the whole table can be
//! reviewed (and snapshot-tested) in one place.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use super::{ConflictPolicy, Strategy};

/// What currently exists at a target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingState {
    /// Nothing exists.
    Absent,
    /// A regular file.
    RegularFile,
    /// A symbolic link, dangling or not.
    Symlink,
    /// A directory.
    Directory,
}

impl ExistingState {
    /// Every state.
    pub const ALL: [Self; 4] = [
        Self::Absent,
        Self::RegularFile,
        Self::Symlink,
        Self::Directory,
    ];
}

impl fmt::Display for ExistingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absent => "absent",
            Self::RegularFile => "regular_file",
            Self::Symlink => "symlink",
            Self::Directory => "directory",
        })
    }
}

/// Classify `path` without following a final symlink.
///
/// Special files (sockets, FIFOs, devices) are reported as
/// [`ExistingState::RegularFile`].
///
/// # Errors
///
/// Returns the underlying error for anything other than "not found".
pub fn inspect(path: &Path) -> std::io::Result<ExistingState> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            let ft = meta.file_type();
            Ok(if ft.is_symlink() {
                ExistingState::Symlink
            } else if ft.is_dir() {
                ExistingState::Directory
            } else {
                ExistingState::RegularFile
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ExistingState::Absent),
        Err(e) => Err(e),
    }
}

/// How the reconciler should treat an occupied target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Write the target.
    Proceed,
    /// Leave the target alone.
    Skip,
    /// Back up the target, then write it.
    BackupThenProceed,
    /// Merge into the existing target.
    Merge,
    /// No safe resolution exists.
    Error(String),
}

impl fmt::Display for ConflictDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proceed => f.write_str("proceed"),
            Self::Skip => f.write_str("skip"),
            Self::BackupThenProceed => f.write_str("backup_then_proceed"),
            Self::Merge => f.write_str("merge"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// A decision plus the warning explaining a degraded policy, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// What to do.
    pub decision: ConflictDecision,
    /// Why the policy was degraded.
    pub warning: Option<String>,
}

impl Resolution {
    const fn plain(decision: ConflictDecision) -> Self {
        Self {
            decision,
            warning: None,
        }
    }

    fn degraded(reason: &str) -> Self {
        Self {
            decision: ConflictDecision::BackupThenProceed,
            warning: Some(format!("merge is not possible: {reason}; backing up instead")),
        }
    }
}

/// Decide how to treat `state` under `policy` for a deploy using `strategy`.
#[must_use]
pub fn decide(state: ExistingState, policy: ConflictPolicy, strategy: Strategy) -> Resolution {
    use ConflictDecision as D;
    use ConflictPolicy as P;
    use ExistingState as E;

    match (policy, state, strategy) {
        (_, E::Absent, _) => Resolution::plain(D::Proceed),
        (P::Overwrite, _, _) => Resolution::plain(D::Proceed),
        (P::Skip, _, _) => Resolution::plain(D::Skip),
        (P::Backup, _, _) => Resolution::plain(D::BackupThenProceed),
        (P::Merge, E::RegularFile, Strategy::Copy | Strategy::Template) => {
            Resolution::plain(D::Merge)
        }
        (P::Merge, E::RegularFile, Strategy::Symlink) => {
            Resolution::degraded("a symlink deploy has no content to merge")
        }
        (P::Merge, E::Symlink, _) => Resolution::degraded("the target is a symlink"),
        (P::Merge, E::Directory, _) => Resolution::degraded("the target is a directory"),
    }
}
