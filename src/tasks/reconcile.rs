//! The per-resource reconciliation pipeline.
//!
//! [`Reconciler::reconcile`] walks one [`ManagedResource`] through
//!
//! ```text
//! Pending -> Detecting -> {Skipped | GatedWarn | Continuing}
//!         -> ResolvingConflict -> BackingUp? -> Deploying
//!         -> SettingPermissions -> Done
//! ```
//!
//! with `Failed` reachable from every step.  Recoverable conditions (a
//! missing application, the `skip` policy) end in `Done` with `skipped`
//! set; only fatal errors end in `Failed`.  Every visited phase is kept in
//! [`DeploymentOutcome::trace`].
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::logging::Log;
use crate::platform::PlatformContext;
use crate::resources::backup::BackupManager;
use crate::resources::chmod::{ModeRequest, apply_mode};
use crate::resources::conflict::{ConflictDecision, ExistingState, decide, inspect};
use crate::resources::deploy::{DeployRequest, Deployer};
use crate::resources::detect::{Detector, GateVerdict, evaluate_gate};
use crate::resources::error::ReconcileError;
use crate::resources::helpers::fs::check_dir_creatable;
use crate::resources::outcome::{DeploymentOutcome, Diagnostic, Phase, Severity};
use crate::resources::paths::{PathResolver, PathVars};
use crate::resources::template::TemplateContext;
use crate::resources::{
    ConflictPolicy, GlobalPolicy, ManagedResource, ResourceChange, ResourceState, Strategy,
};

/// Shared cancellation flag, set from the ctrl-c handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives resources through detection, conflict handling, backup,
/// deployment and permission enforcement.
#[derive(Debug)]
pub struct Reconciler {
    platform: Arc<PlatformContext>,
    detector: Detector,
    deployer: Deployer,
    cancel: CancelToken,
}

impl Reconciler {
    /// Reconciler with a never-cancelled token.
    #[must_use]
    pub fn new(platform: Arc<PlatformContext>, detector: Detector, deployer: Deployer) -> Self {
        Self {
            platform,
            detector,
            deployer,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` instead of a private, never-cancelled token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Platform targets are resolved against.
    #[must_use]
    pub fn platform(&self) -> &PlatformContext {
        &self.platform
    }

    /// Reconcile one resource.  Never panics and never returns an error:
    /// fatal problems are recorded in [`DeploymentOutcome::failure`].
    pub fn reconcile(
        &self,
        resource: &ManagedResource,
        policy: &GlobalPolicy,
        log: &dyn Log,
    ) -> DeploymentOutcome {
        let mut run = Run {
            outcome: DeploymentOutcome::pending(&resource.id),
            log,
            dry_run: policy.dry_run,
            deadline: policy.resource_timeout.map(|t| Instant::now() + t),
            cancel: &self.cancel,
        };
        log.debug(&format!("reconciling {}", resource.description()));
        match self.pipeline(resource, policy, &mut run) {
            Ok(()) => run.finish(),
            Err(err) => run.fail(err),
        }
    }

    fn pipeline(
        &self,
        resource: &ManagedResource,
        policy: &GlobalPolicy,
        run: &mut Run<'_>,
    ) -> Result<(), ReconcileError> {
        resource.validate()?;
        let modes = ModeRequest::parse(
            resource.file_mode.as_deref(),
            resource.dir_mode.as_deref(),
            resource.recursive,
        )
        .map_err(|e| ReconcileError::validation(&resource.id, e.to_string()))?;

        run.enter(Phase::Detecting);
        if let Some(gate) = &resource.gate {
            let methods = gate.methods.as_deref().unwrap_or(&policy.detection_methods);
            let detection = self
                .detector
                .detect(&gate.application, methods, &self.platform);
            let verdict = evaluate_gate(gate, &detection);
            run.outcome.detection = Some(detection);
            match verdict {
                GateVerdict::Skip(reason) => {
                    run.enter(Phase::Skipped);
                    run.outcome.skipped = true;
                    run.note(Diagnostic::info(format!("skipped: {reason}")));
                    return Ok(());
                }
                GateVerdict::Warn(reason) => {
                    run.enter(Phase::GatedWarn);
                    run.note(Diagnostic::warning(reason));
                }
                GateVerdict::Continue(reason) => {
                    run.log
                        .debug(&format!("{}: gate not met, continuing: {reason}", resource.id));
                    run.enter(Phase::Continuing);
                }
                GateVerdict::Pass => run.enter(Phase::Continuing),
            }
        } else {
            run.enter(Phase::Continuing);
        }

        run.enter(Phase::ResolvingConflict);
        let app_name = resource
            .gate
            .as_ref()
            .map_or(resource.id.as_str(), |g| g.application.as_str());
        let target =
            PathResolver::new(&self.platform).resolve(&resource.target, &PathVars::app(app_name))?;
        run.outcome.applied_path = Some(target.clone());

        let strategy = resource.effective_strategy();
        let context = (strategy == Strategy::Template).then(|| {
            TemplateContext::compose(&resource.vars, &self.platform, &resource.platform_vars)
        });
        let request = DeployRequest {
            source: &resource.source,
            target: &target,
            strategy,
            dry_run: run.dry_run,
            context: context.as_ref(),
        };
        let prepared = self.deployer.prepare(&request)?;
        let state =
            inspect(&target).map_err(|e| ReconcileError::from_io("inspect", &target, &e))?;

        match Deployer::check(&prepared, &target) {
            ResourceState::Invalid { reason } => {
                run.outcome.decision = Some(ConflictDecision::Error(reason.clone()));
                return Err(ReconcileError::Conflict {
                    path: target.display().to_string(),
                    reason,
                });
            }
            ResourceState::Correct => {
                run.note(Diagnostic::info(format!(
                    "{} is already up to date",
                    target.display()
                )));
                run.enter(Phase::SettingPermissions);
                run.permissions(&target, &modes);
                return Ok(());
            }
            ResourceState::Missing | ResourceState::Incorrect { .. } => {}
        }

        let backup_policy = resource
            .backup
            .clone()
            .unwrap_or_else(|| policy.backup.clone());
        let mut conflict_policy = resource
            .conflict_policy
            .unwrap_or(policy.default_conflict_policy);
        if !backup_policy.enabled
            && state != ExistingState::Absent
            && matches!(conflict_policy, ConflictPolicy::Backup | ConflictPolicy::Merge)
        {
            run.note(Diagnostic::warning(format!(
                "backups are disabled; {} will be replaced without one",
                target.display()
            )));
            conflict_policy = ConflictPolicy::Overwrite;
        }

        let resolution = decide(state, conflict_policy, strategy);
        if let Some(warning) = resolution.warning {
            run.note(Diagnostic::warning(warning));
        }
        run.outcome.decision = Some(resolution.decision.clone());
        let needs_backup = match &resolution.decision {
            ConflictDecision::Proceed => false,
            ConflictDecision::BackupThenProceed => true,
            ConflictDecision::Merge => {
                run.note(Diagnostic::warning(format!(
                    "content merge is not implemented; backing up {} and replacing it",
                    target.display()
                )));
                true
            }
            ConflictDecision::Skip => {
                run.outcome.skipped = true;
                run.note(Diagnostic::info(format!(
                    "{} exists ({state}); left untouched under the skip policy",
                    target.display()
                )));
                return Ok(());
            }
            ConflictDecision::Error(reason) => {
                return Err(ReconcileError::Conflict {
                    path: target.display().to_string(),
                    reason: reason.clone(),
                });
            }
        };

        if needs_backup {
            run.check_cancel("backup")?;
            run.enter(Phase::BackingUp);
            let manager = BackupManager::new(&policy.backup_dir);
            if run.dry_run {
                let dir = manager.directory(&backup_policy);
                check_dir_creatable(dir).map_err(|e| ReconcileError::Backup {
                    path: target.display().to_string(),
                    reason: format!("cannot create {}: {e}", dir.display()),
                })?;
                let planned = manager.planned_path(&target, &backup_policy, &resource.id);
                run.note(Diagnostic::info(format!(
                    "would back up {} to {}",
                    target.display(),
                    planned.display()
                )));
                for warning in BackupManager::expected_warnings(state, &backup_policy) {
                    run.note(Diagnostic::warning(warning));
                }
            } else {
                let backup = manager.backup(&target, &backup_policy, &resource.id)?;
                for warning in backup.warnings {
                    run.note(Diagnostic::warning(warning));
                }
                run.note(Diagnostic::info(format!(
                    "backed up {} to {}",
                    target.display(),
                    backup.record.backup_path.display()
                )));
                run.outcome.backup = Some(backup.record);
            }
        }

        run.check_cancel("deploy")?;
        run.enter(Phase::Deploying);
        let report = Deployer::deploy(&request, &prepared)?;
        run.outcome.changed = report.change == ResourceChange::Applied;
        for diagnostic in report.diagnostics {
            run.note(diagnostic);
        }

        run.enter(Phase::SettingPermissions);
        run.permissions(&target, &modes);
        Ok(())
    }
}

/// Mutable state of one pipeline run.
struct Run<'a> {
    outcome: DeploymentOutcome,
    log: &'a dyn Log,
    dry_run: bool,
    deadline: Option<Instant>,
    cancel: &'a CancelToken,
}

impl Run<'_> {
    fn enter(&mut self, phase: Phase) {
        self.log.debug(&format!(
            "{}: {:?} -> {phase:?}",
            self.outcome.resource_id,
            self.outcome.phase()
        ));
        self.outcome.trace.push(phase);
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        let msg = format!("{}: {}", self.outcome.resource_id, diagnostic.message);
        match diagnostic.severity {
            Severity::Info if self.dry_run => self.log.dry_run(&msg),
            Severity::Info => self.log.debug(&msg),
            Severity::Warning => self.log.warn(&msg),
            Severity::Error => self.log.error(&msg),
        }
        self.outcome.diagnostics.push(diagnostic);
    }

    fn check_cancel(&self, step: &str) -> Result<(), ReconcileError> {
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        if self.cancel.is_cancelled() || expired {
            return Err(ReconcileError::Cancelled {
                step: step.to_string(),
            });
        }
        Ok(())
    }

    fn permissions(&mut self, target: &std::path::Path, modes: &ModeRequest) {
        let report = apply_mode(target, modes, self.dry_run);
        self.outcome.applied_mode = report.applied_mode;
        for diagnostic in report.diagnostics {
            self.note(diagnostic);
        }
    }

    fn finish(mut self) -> DeploymentOutcome {
        self.enter(Phase::Done);
        self.outcome.success = true;
        self.outcome
    }

    fn fail(mut self, err: ReconcileError) -> DeploymentOutcome {
        self.note(Diagnostic::error(err.to_string()));
        self.enter(Phase::Failed);
        self.outcome.success = false;
        self.outcome.failure = Some(err);
        self.outcome
    }
}
