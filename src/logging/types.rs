//! Summary entries, resource status, and the [`Log`] trait.

/// One line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    /// Resource identifier.
    pub name: String,
    /// Final status.
    pub status: ResourceStatus,
    /// Optional detail (skip reason, failure description).
    pub message: Option<String>,
}

/// How a resource ended up after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// The target was created or replaced.
    Changed,
    /// The target already matched.
    Unchanged,
    /// A gate or the `skip` policy left the target alone.
    Skipped,
    /// Dry run; the target would have changed.
    DryRun,
    /// Reconciliation failed.
    Failed,
}

/// Abstraction over logging backends.
///
/// Both [`Logger`](super::logger::Logger) (direct output) and
/// [`BufferedLog`](super::buffered::BufferedLog) (deferred output for
/// parallel reconciliation) implement this trait, so pipeline code logs
/// without knowing whether output is immediate or buffered.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (suppressed on console unless verbose).
    fn debug(&self, msg: &str);
    /// Log a warning.
    fn warn(&self, msg: &str);
    /// Log an error.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Record a resource result for the summary.
    fn record_resource(&self, name: &str, status: ResourceStatus, message: Option<&str>);
}
