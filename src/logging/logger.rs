//! Structured logger with dry-run awareness and summary collection.
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{Log, ResourceStatus, SummaryEntry};
use super::utils::log_file_path;
use super::{DRY_RUN_TARGET, STAGE_TARGET};

/// Console/file logger that also collects the per-resource run summary.
///
/// Messages go through `tracing`; whichever subscriber is installed decides
/// where they land.  [`init_subscriber`](super::subscriber::init_subscriber)
/// installs the console formatter and the log file layer.
#[derive(Debug)]
pub struct Logger {
    entries: Mutex<Vec<SummaryEntry>>,
    log_file: Option<PathBuf>,
    /// Serializes replay of buffered output from parallel resources.
    pub(super) flush_lock: Mutex<()>,
}

impl Logger {
    /// Logger for `command`, pointing the summary at its default log file.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(command))
    }

    /// Logger whose summary reports `log_file` (or none).
    #[must_use]
    pub const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            log_file,
            flush_lock: Mutex::new(()),
        }
    }

    /// Path of the persistent log file, if one is open.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Snapshot of the recorded summary entries.
    #[must_use]
    pub fn entries(&self) -> Vec<SummaryEntry> {
        self.entries.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Record a resource result for the summary.
    pub fn record_resource(&self, name: &str, status: ResourceStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(SummaryEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Count the number of failed resources.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.entries.lock().map_or(0, |guard| {
            guard
                .iter()
                .filter(|t| t.status == ResourceStatus::Failed)
                .count()
        })
    }

    /// Whether any recorded resource failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// Print the summary of all recorded resources.
    pub fn print_summary(&self) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }

        self.stage("Summary");

        let mut changed = 0u32;
        let mut unchanged = 0u32;
        let mut skipped = 0u32;
        let mut dry_run = 0u32;
        let mut failed = 0u32;

        for entry in &entries {
            let (icon, color) = match entry.status {
                ResourceStatus::Changed => {
                    changed += 1;
                    ("✓", "\x1b[32m")
                }
                ResourceStatus::Unchanged => {
                    unchanged += 1;
                    ("·", "\x1b[2m")
                }
                ResourceStatus::Skipped => {
                    skipped += 1;
                    ("○", "\x1b[33m")
                }
                ResourceStatus::DryRun => {
                    dry_run += 1;
                    ("~", "\x1b[37m")
                }
                ResourceStatus::Failed => {
                    failed += 1;
                    ("✗", "\x1b[31m")
                }
            };

            let suffix = entry
                .message
                .as_ref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));

            self.info(&format!("{color}{icon} {}{suffix}\x1b[0m", entry.name));
        }

        let total = changed + unchanged + skipped + dry_run + failed;
        self.info(&format!(
            "{total} resources: \x1b[32m{changed} changed\x1b[0m, \x1b[2m{unchanged} unchanged\x1b[0m, \x1b[33m{skipped} skipped\x1b[0m, \x1b[37m{dry_run} dry-run\x1b[0m, \x1b[31m{failed} failed\x1b[0m"
        ));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    fn record_resource(&self, name: &str, status: ResourceStatus, message: Option<&str>) {
        self.record_resource(name, status, message);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::logging::isolated_logger;
    use std::fs;

    #[test]
    fn record_resource_with_message() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record_resource("gitconfig", ResourceStatus::Skipped, Some("git is not installed"));
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "gitconfig");
        assert_eq!(entries[0].message.as_deref(), Some("git is not installed"));
    }

    #[test]
    fn failure_count_returns_correct_count() {
        let (log, _tmp, _guard) = isolated_logger();
        assert!(!log.has_failures());
        log.record_resource("a", ResourceStatus::Changed, None);
        log.record_resource("b", ResourceStatus::Failed, Some("error 1"));
        log.record_resource("c", ResourceStatus::Failed, Some("error 2"));
        log.record_resource("d", ResourceStatus::DryRun, None);
        assert_eq!(log.failure_count(), 2);
        assert!(log.has_failures());
    }

    #[test]
    fn log_trait_delegates_to_logger() {
        let (log, _tmp, _guard) = isolated_logger();
        let log_ref: &dyn Log = &log;
        log_ref.record_resource("via-trait", ResourceStatus::Unchanged, None);
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn messages_reach_log_file_with_tags() {
        let (log, _tmp, _guard) = isolated_logger();
        let pid = std::process::id();
        log.debug(&format!("debug-{pid}"));
        log.warn(&format!("warn-{pid}"));
        log.error(&format!("error-{pid}"));
        log.stage(&format!("stage-{pid}"));
        log.dry_run(&format!("dry-{pid}"));

        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        assert!(contents.contains(&format!("[debug] debug-{pid}")));
        assert!(contents.contains(&format!("[warn] warn-{pid}")));
        assert!(contents.contains(&format!("[error] error-{pid}")));
        assert!(contents.contains(&format!("==> stage-{pid}")));
        assert!(contents.contains(&format!("[dry run] dry-{pid}")));
    }

    #[test]
    fn summary_counts_each_status() {
        let (log, _tmp, _guard) = isolated_logger();
        log.record_resource("a", ResourceStatus::Changed, None);
        log.record_resource("b", ResourceStatus::Unchanged, None);
        log.record_resource("c", ResourceStatus::Failed, Some("boom"));
        log.print_summary();

        let contents = fs::read_to_string(log.log_path().expect("log path")).unwrap();
        assert!(contents.contains("✗ c (boom)"));
        assert!(contents.contains(
            "3 resources: 1 changed, 1 unchanged, 0 skipped, 0 dry-run, 1 failed"
        ));
    }
}
