//! Batch reconciliation: run every declared resource and collect outcomes.
pub mod reconcile;

pub use reconcile::{CancelToken, Reconciler};

use std::sync::Arc;

use crate::logging::{BufferedLog, Log, Logger, ResourceStatus};
use crate::resources::outcome::DeploymentOutcome;
use crate::resources::{GlobalPolicy, ManagedResource};

/// Counters over a batch of outcomes.
///
/// # Examples
///
/// ```
/// use converge::tasks::ReconcileStats;
///
/// let stats = ReconcileStats { changed: 3, unchanged: 10, skipped: 0, failed: 0 };
/// assert_eq!(stats.summary(false), "3 changed, 10 already ok");
/// assert_eq!(stats.summary(true), "3 would change, 10 already ok");
/// ```
///
/// Skips and failures are only mentioned when present:
///
/// ```
/// use converge::tasks::ReconcileStats;
///
/// let stats = ReconcileStats { changed: 1, unchanged: 2, skipped: 3, failed: 1 };
/// assert_eq!(stats.summary(false), "1 changed, 2 already ok, 3 skipped, 1 failed");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Targets created or replaced.
    pub changed: u32,
    /// Targets that already matched.
    pub unchanged: u32,
    /// Resources left alone.
    pub skipped: u32,
    /// Resources that failed.
    pub failed: u32,
}

impl ReconcileStats {
    /// Tally `outcomes`.
    #[must_use]
    pub fn from_outcomes(outcomes: &[DeploymentOutcome], dry_run: bool) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            match status_of(outcome, dry_run) {
                ResourceStatus::Changed | ResourceStatus::DryRun => stats.changed += 1,
                ResourceStatus::Unchanged => stats.unchanged += 1,
                ResourceStatus::Skipped => stats.skipped += 1,
                ResourceStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        let mut out = format!("{} {verb}, {} already ok", self.changed, self.unchanged);
        if self.skipped > 0 {
            out.push_str(&format!(", {} skipped", self.skipped));
        }
        if self.failed > 0 {
            out.push_str(&format!(", {} failed", self.failed));
        }
        out
    }
}

/// Summary status of one outcome.
///
/// A dry run reports `DryRun` for every resource that reached the deploy
/// step, since that is where it would have changed something.
#[must_use]
pub fn status_of(outcome: &DeploymentOutcome, dry_run: bool) -> ResourceStatus {
    use crate::resources::outcome::Phase;

    if !outcome.success {
        ResourceStatus::Failed
    } else if outcome.skipped {
        ResourceStatus::Skipped
    } else if outcome.changed {
        ResourceStatus::Changed
    } else if dry_run && outcome.visited(Phase::Deploying) {
        ResourceStatus::DryRun
    } else {
        ResourceStatus::Unchanged
    }
}

/// Record `outcome` in the run summary.
pub fn record_outcome(log: &dyn Log, outcome: &DeploymentOutcome, dry_run: bool) {
    let status = status_of(outcome, dry_run);
    let message = match status {
        ResourceStatus::Failed => outcome.failure.as_ref().map(ToString::to_string),
        ResourceStatus::Skipped => outcome.diagnostics.last().map(|d| d.message.clone()),
        ResourceStatus::Changed | ResourceStatus::Unchanged | ResourceStatus::DryRun => None,
    };
    log.record_resource(&outcome.resource_id, status, message.as_deref());
}

/// Reconcile `resources` and return their outcomes in declaration order.
///
/// With `parallel`, resources run on the rayon pool, each logging into a
/// [`BufferedLog`] that is flushed as one block when the resource finishes.
pub fn reconcile_all(
    reconciler: &Reconciler,
    resources: &[ManagedResource],
    policy: &GlobalPolicy,
    parallel: bool,
    log: &Arc<Logger>,
) -> Vec<DeploymentOutcome> {
    if parallel && resources.len() > 1 {
        use rayon::prelude::*;
        resources
            .par_iter()
            .map(|resource| {
                let buffered = BufferedLog::new(Arc::clone(log));
                let outcome = reconciler.reconcile(resource, policy, &buffered);
                record_outcome(&buffered, &outcome, policy.dry_run);
                buffered.flush();
                outcome
            })
            .collect()
    } else {
        resources
            .iter()
            .map(|resource| {
                let outcome = reconciler.reconcile(resource, policy, log.as_ref());
                record_outcome(log.as_ref(), &outcome, policy.dry_run);
                outcome
            })
            .collect()
    }
}
