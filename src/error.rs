//! Domain-specific error types for the convergence engine.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`], [`SyncError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! ConvergeError
//! ├── Config(ConfigError)       TOML parsing, resource declaration issues
//! ├── Reconcile(ReconcileError) per-resource pipeline failures
//! └── Sync(SyncError)           remote source repository failures
//! ```

use thiserror::Error;

pub use crate::resources::error::ReconcileError;

/// Top-level error type for the convergence engine.
///
/// Aggregates domain-specific sub-errors and is convertible to
/// [`anyhow::Error`] for use at CLI command boundaries.
#[derive(Error, Debug)]
pub enum ConvergeError {
    /// Configuration-related error (parsing, resource conversion, I/O).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A resource could not be reconciled.
    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// The source repository could not be synchronized.
    #[error("Source sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Errors that arise from loading and converting the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file does not exist at the resolved location.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// The TOML document could not be parsed into the config schema.
    #[error("Invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// Path of the file that failed to parse.
        file: String,
        /// Parser message.
        message: String,
    },

    /// A resource entry is structurally invalid.
    #[error("Invalid resource '{resource}': {reason}")]
    InvalidResource {
        /// Identifier of the offending entry.
        resource: String,
        /// Explanation of the problem.
        reason: String,
    },

    /// A setting value is out of range or malformed.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// The `[settings]` key.
        key: String,
        /// Explanation of the problem.
        reason: String,
    },

    /// A path in the config could not be expanded.
    #[error("Cannot resolve path in config: {0}")]
    Path(#[from] ReconcileError),

    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise while cloning or updating the source repository.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A libgit2 operation failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The operation being attempted (`clone`, `fetch`, …).
        operation: String,
        /// Message reported by libgit2.
        message: String,
    },

    /// The local branch has diverged and cannot be fast-forwarded.
    #[error("branch '{0}' has diverged from its remote; refusing to update")]
    Diverged(String),

    /// `HEAD` does not point at a branch.
    #[error("repository at {0} has a detached HEAD")]
    DetachedHead(String),

    /// A filesystem operation on the cache directory failed.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path being operated on.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl SyncError {
    /// Build a mapper from [`git2::Error`] tagged with `operation`.
    pub(crate) fn git(operation: &str) -> impl FnOnce(git2::Error) -> Self + '_ {
        move |err| Self::Git {
            operation: operation.to_string(),
            message: err.message().to_string(),
        }
    }
}
