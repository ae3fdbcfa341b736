//! Command: converge declared resources (`apply`), or preview them (`plan`).
use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{ApplyOpts, GlobalOpts};
use crate::logging::{Log, Logger};
use crate::resources::ManagedResource;
use crate::resources::outcome::DeploymentOutcome;
use crate::tasks::{self, CancelToken, ReconcileStats};

/// Run the apply command.  `plan` calls this with `force_dry_run`.
///
/// # Errors
///
/// Returns an error if setup fails, `--only` names an unknown resource, or
/// any resource fails to reconcile.
pub fn run(
    global: &GlobalOpts,
    opts: &ApplyOpts,
    force_dry_run: bool,
    log: &Arc<Logger>,
    cancel: CancelToken,
) -> Result<()> {
    let dry_run = global.dry_run || force_dry_run;
    log.info(&format!("converge {}", super::version::version()));

    let setup = CommandSetup::init(global, dry_run, log.as_ref())?;
    let selected = select(&setup.resources, &opts.only)?;
    let parallel = global.parallel && setup.config.settings.parallel;

    log.stage(if dry_run {
        "Planning resources"
    } else {
        "Reconciling resources"
    });
    let reconciler = setup.reconciler(cancel);
    let outcomes = tasks::reconcile_all(&reconciler, &selected, &setup.policy, parallel, log);

    let stats = ReconcileStats::from_outcomes(&outcomes, dry_run);
    log.info(&stats.summary(dry_run));
    if opts.json {
        print_json(&outcomes)?;
    }

    super::finish(log)
}

/// Resources named by `--only`, in declaration order; all when empty.
///
/// # Errors
///
/// Returns an error naming every id that matches no resource.
pub fn select(resources: &[ManagedResource], only: &[String]) -> Result<Vec<ManagedResource>> {
    if only.is_empty() {
        return Ok(resources.to_vec());
    }
    let unknown: Vec<&str> = only
        .iter()
        .map(String::as_str)
        .filter(|id| !resources.iter().any(|r| r.id == *id))
        .collect();
    if !unknown.is_empty() {
        anyhow::bail!("unknown resource id(s): {}", unknown.join(", "));
    }
    Ok(resources
        .iter()
        .filter(|r| only.iter().any(|id| *id == r.id))
        .cloned()
        .collect())
}

fn print_json(outcomes: &[DeploymentOutcome]) -> Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(outcomes)?)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::resources::Strategy;

    fn resources() -> Vec<ManagedResource> {
        ["bashrc", "vimrc", "gitconfig"]
            .iter()
            .map(|id| {
                ManagedResource::new(*id, format!("/s/{id}"), format!("~/.{id}"), Strategy::Symlink)
            })
            .collect()
    }

    #[test]
    fn empty_only_selects_everything() {
        assert_eq!(select(&resources(), &[]).unwrap().len(), 3);
    }

    #[test]
    fn only_keeps_declaration_order() {
        let only = vec!["gitconfig".to_string(), "bashrc".to_string()];
        let picked = select(&resources(), &only).unwrap();
        let ids: Vec<&str> = picked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["bashrc", "gitconfig"]);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let only = vec!["zshrc".to_string()];
        let err = select(&resources(), &only).unwrap_err();
        assert_eq!(err.to_string(), "unknown resource id(s): zshrc");
    }
}
