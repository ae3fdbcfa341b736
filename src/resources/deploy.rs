//! Materializes a resource at its target.
//!
//! Deployment is split in two so that dry runs behave like live runs up to
//! the point of mutation:
//!
//! 1. [`Deployer::prepare`] validates the source and, for templates, renders
//!    it.  It never touches the target.
//! 2. [`Deployer::deploy`] applies the prepared content, or describes what it
//!    would do when `dry_run` is set.
//!
//! [`Deployer::check`] compares a prepared resource against the target so the
//! reconciler can stop early when nothing needs to change.
use std::fmt;
use std::fs::Permissions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::conflict::{ExistingState, inspect};
use super::error::ReconcileError;
use super::helpers::fs::{
    check_parent_dir, copy_dir_recursive, ensure_parent_dir, temp_sibling, trees_equal,
};
use super::outcome::Diagnostic;
use super::symlink::{create_symlink, points_to, remove_entry};
use super::template::{TemplateContext, TemplateRenderer};
use super::{ResourceChange, ResourceState, Strategy};

/// Inputs for one deployment.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    /// Source path.
    pub source: &'a Path,
    /// Resolved target path.
    pub target: &'a Path,
    /// How to produce the target.
    pub strategy: Strategy,
    /// Report without writing.
    pub dry_run: bool,
    /// Variables for the template strategy; ignored otherwise.
    pub context: Option<&'a TemplateContext>,
}

/// Bytes written for a file deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Copy the source file verbatim.
    Source,
    /// Write rendered template output.
    Rendered(String),
}

/// A validated source, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Link the target to `source`.
    Link {
        /// Link destination.
        source: PathBuf,
    },
    /// Write a single file carrying the source's permission bits.
    File {
        /// Source file.
        source: PathBuf,
        /// Bytes to write.
        content: FileContent,
        /// Permission bits copied from the source.
        permissions: Permissions,
    },
    /// Copy a directory tree.
    Tree {
        /// Root of the source tree.
        source: PathBuf,
    },
}

impl Prepared {
    fn source(&self) -> &Path {
        match self {
            Self::Link { source } | Self::Tree { source } | Self::File { source, .. } => source,
        }
    }
}

/// What a deployment did (or would do).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// What happened to the target.
    pub change: ResourceChange,
    /// Non-fatal problems.
    pub diagnostics: Vec<Diagnostic>,
}

/// Executes symlink, copy and template deployments.
pub struct Deployer {
    renderer: Arc<dyn TemplateRenderer>,
}

impl fmt::Debug for Deployer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployer").finish_non_exhaustive()
    }
}

impl Deployer {
    /// Deployer rendering templates with `renderer`.
    #[must_use]
    pub fn new(renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { renderer }
    }

    /// Validate the source for `request.strategy` and render templates.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::NotFound`] if the source does not exist (for a
    ///   symlink source, if it does not resolve).
    /// - [`ReconcileError::Render`] if a template cannot be read as UTF-8
    ///   text or fails to render.
    /// - [`ReconcileError::Permission`] / [`ReconcileError::Io`] if the
    ///   source cannot be read.
    pub fn prepare(&self, request: &DeployRequest<'_>) -> Result<Prepared, ReconcileError> {
        let source = request.source;
        let meta = std::fs::metadata(source).map_err(|e| source_error(source, &e))?;

        match request.strategy {
            Strategy::Symlink => Ok(Prepared::Link {
                source: source.to_path_buf(),
            }),
            Strategy::Copy if meta.is_dir() => Ok(Prepared::Tree {
                source: source.to_path_buf(),
            }),
            Strategy::Copy => Ok(Prepared::File {
                source: source.to_path_buf(),
                content: FileContent::Source,
                permissions: meta.permissions(),
            }),
            Strategy::Template => {
                let render_error = |reason: String| ReconcileError::Render {
                    template: source.display().to_string(),
                    reason,
                };
                if !meta.is_file() {
                    return Err(render_error("template source is not a regular file".into()));
                }
                let text = std::fs::read_to_string(source).map_err(|e| {
                    if e.kind() == io::ErrorKind::InvalidData {
                        render_error("template is not valid UTF-8".into())
                    } else {
                        source_error(source, &e)
                    }
                })?;
                let empty = TemplateContext::default();
                let context = request.context.unwrap_or(&empty);
                let name = source.display().to_string();
                let rendered = self
                    .renderer
                    .render(&name, &text, context)
                    .map_err(|e| render_error(e.0))?;
                Ok(Prepared::File {
                    source: source.to_path_buf(),
                    content: FileContent::Rendered(rendered),
                    permissions: meta.permissions(),
                })
            }
        }
    }

    /// Compare the target against `prepared`.
    ///
    /// [`ResourceState::Invalid`] means deploying would destroy the source:
    /// the target is the source itself or contains it, or a tree copy would
    /// land inside its own source.
    #[must_use]
    pub fn check(prepared: &Prepared, target: &Path) -> ResourceState {
        let state = match inspect(target) {
            Ok(state) => state,
            Err(e) => {
                return ResourceState::Incorrect {
                    current: format!("unreadable: {e}"),
                };
            }
        };
        if state == ExistingState::Absent {
            return ResourceState::Missing;
        }
        if let Some(reason) = self_conflict(prepared, target, state) {
            return ResourceState::Invalid { reason };
        }

        let converged = match prepared {
            Prepared::Link { source } => points_to(target, source),
            Prepared::File {
                source, content, ..
            } => state == ExistingState::RegularFile && file_matches(source, content, target),
            Prepared::Tree { source } => {
                state == ExistingState::Directory && trees_equal(source, target)
            }
        };
        if converged {
            ResourceState::Correct
        } else {
            ResourceState::Incorrect {
                current: describe(state, target),
            }
        }
    }

    /// Whether the target already holds exactly what `prepared` would write.
    #[must_use]
    pub fn is_converged(prepared: &Prepared, target: &Path) -> bool {
        Self::check(prepared, target) == ResourceState::Correct
    }

    /// Replace whatever is at `request.target` with `prepared`.
    ///
    /// The caller has already resolved any conflict and taken any backup.
    /// With `dry_run` nothing on disk changes, but a parent chain that
    /// cannot be created fails the same way it would live.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Permission`] / [`ReconcileError::Io`] when
    /// the filesystem refuses a step.
    pub fn deploy(
        request: &DeployRequest<'_>,
        prepared: &Prepared,
    ) -> Result<DeployReport, ReconcileError> {
        let target = request.target;
        let summary = summarize(prepared, target);
        if request.dry_run {
            check_parent_dir(target)
                .map_err(|e| ReconcileError::from_io("create parent of", target, &e))?;
            return Ok(DeployReport {
                change: ResourceChange::Skipped {
                    reason: "dry run".into(),
                },
                diagnostics: vec![Diagnostic::info(format!("would {summary}"))],
            });
        }

        ensure_parent_dir(target)
            .map_err(|e| ReconcileError::from_io("create parent of", target, &e))?;
        match prepared {
            Prepared::Link { source } => {
                remove_entry(target).map_err(|e| ReconcileError::from_io("remove", target, &e))?;
                create_symlink(source, target)
                    .map_err(|e| ReconcileError::from_io("link", target, &e))?;
            }
            Prepared::File {
                source,
                content,
                permissions,
            } => write_file(source, content, permissions, target)?,
            Prepared::Tree { source } => {
                remove_entry(target).map_err(|e| ReconcileError::from_io("remove", target, &e))?;
                copy_dir_recursive(source, target, true)
                    .map_err(|e| ReconcileError::from_io("copy tree to", target, &e))?;
            }
        }

        tracing::debug!(target = %target.display(), "{summary}");
        Ok(DeployReport {
            change: ResourceChange::Applied,
            diagnostics: vec![Diagnostic::info(summary)],
        })
    }
}

fn source_error(source: &Path, err: &io::Error) -> ReconcileError {
    if err.kind() == io::ErrorKind::NotFound {
        ReconcileError::NotFound {
            path: source.display().to_string(),
        }
    } else {
        ReconcileError::from_io("read source", source, err)
    }
}

fn self_conflict(prepared: &Prepared, target: &Path, state: ExistingState) -> Option<String> {
    let source = dunce::canonicalize(prepared.source()).ok()?;
    // A link is replaced, never written through, so only real entries count
    if state == ExistingState::Symlink {
        return None;
    }
    let target = dunce::canonicalize(target).ok()?;
    if source == target {
        Some("target is the source itself".into())
    } else if state == ExistingState::Directory && source.starts_with(&target) {
        Some("target directory contains the source".into())
    } else if matches!(prepared, Prepared::Tree { .. }) && target.starts_with(&source) {
        Some("target lies inside the source tree".into())
    } else {
        None
    }
}

fn file_matches(source: &Path, content: &FileContent, target: &Path) -> bool {
    let Ok(actual) = std::fs::read(target) else {
        return false;
    };
    match content {
        FileContent::Source => std::fs::read(source).is_ok_and(|bytes| bytes == actual),
        FileContent::Rendered(text) => text.as_bytes() == actual.as_slice(),
    }
}

fn describe(state: ExistingState, target: &Path) -> String {
    match state {
        ExistingState::Symlink => std::fs::read_link(target).map_or_else(
            |_| "symlink".to_string(),
            |dest| format!("symlink to {}", dest.display()),
        ),
        ExistingState::RegularFile => "file with different content".into(),
        ExistingState::Directory => "directory".into(),
        ExistingState::Absent => "absent".into(),
    }
}

fn summarize(prepared: &Prepared, target: &Path) -> String {
    match prepared {
        Prepared::Link { source } => {
            format!("link {} -> {}", target.display(), source.display())
        }
        Prepared::File {
            source,
            content: FileContent::Source,
            ..
        } => format!("copy {} to {}", source.display(), target.display()),
        Prepared::File {
            content: FileContent::Rendered(_),
            ..
        } => format!("write rendered template to {}", target.display()),
        Prepared::Tree { source } => {
            format!("copy tree {} to {}", source.display(), target.display())
        }
    }
}

/// Stage the content to a sibling, then rename over the target.
fn write_file(
    source: &Path,
    content: &FileContent,
    permissions: &Permissions,
    target: &Path,
) -> Result<(), ReconcileError> {
    let staged = temp_sibling(target, "deploy");
    let written = match content {
        FileContent::Source => std::fs::copy(source, &staged).map(|_| ()),
        FileContent::Rendered(text) => std::fs::write(&staged, text)
            .and_then(|()| std::fs::set_permissions(&staged, permissions.clone())),
    };
    let result = written.and_then(|()| {
        // rename() cannot replace a directory
        if inspect(target)? == ExistingState::Directory {
            remove_entry(target)?;
        }
        std::fs::rename(&staged, target)
    });
    if let Err(e) = result {
        let _ = std::fs::remove_file(&staged);
        return Err(ReconcileError::from_io("write", target, &e));
    }
    Ok(())
}
