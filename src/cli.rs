//! Command-line argument definitions.
use clap::{Parser, Subcommand};

use crate::resources::detect::DetectionMethod;

/// Top-level CLI entry point for the convergence engine.
#[derive(Parser, Debug)]
#[command(
    name = "converge",
    about = "Declarative, idempotent convergence of dotfiles onto the local filesystem",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options accepted by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Config file (default: $CONVERGE_CONFIG, then {config}/converge/converge.toml)
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Reconcile resources one at a time (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Converge every declared resource
    Apply(ApplyOpts),
    /// Show what apply would change (apply with --dry-run)
    Plan(ApplyOpts),
    /// Probe for an installed application
    Detect(DetectOpts),
    /// Print version information
    Version,
}

/// Options for the `apply` and `plan` subcommands.
#[derive(Parser, Debug, Clone)]
pub struct ApplyOpts {
    /// Print outcomes as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Reconcile only the given resource ids
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Options for the `detect` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct DetectOpts {
    /// Application name
    pub application: String,

    /// Detection methods to try, in order (default: all)
    #[arg(long, value_delimiter = ',', value_parser = parse_method)]
    pub method: Vec<DetectionMethod>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

fn parse_method(raw: &str) -> Result<DetectionMethod, String> {
    DetectionMethod::ALL
        .into_iter()
        .find(|m| m.as_str() == raw.trim())
        .ok_or_else(|| {
            let known: Vec<&str> = DetectionMethod::ALL.iter().map(|m| m.as_str()).collect();
            format!("unknown method '{raw}' (expected one of {})", known.join(", "))
        })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_apply_with_config() {
        let cli = Cli::parse_from(["converge", "--config", "/c/converge.toml", "apply"]);
        assert_eq!(
            cli.global.config,
            Some(std::path::PathBuf::from("/c/converge.toml"))
        );
        assert!(matches!(cli.command, Command::Apply(_)));
    }

    #[test]
    fn parse_apply_dry_run_short() {
        let cli = Cli::parse_from(["converge", "-d", "apply"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_apply_only_and_json() {
        let cli = Cli::parse_from(["converge", "apply", "--json", "--only", "bashrc,gitconfig"]);
        assert!(
            matches!(&cli.command, Command::Apply(_)),
            "Expected Apply command"
        );
        if let Command::Apply(opts) = cli.command {
            assert!(opts.json);
            assert_eq!(opts.only, vec!["bashrc", "gitconfig"]);
        }
    }

    #[test]
    fn parse_plan() {
        let cli = Cli::parse_from(["converge", "plan", "--json"]);
        assert!(matches!(cli.command, Command::Plan(ApplyOpts { json: true, .. })));
    }

    #[test]
    fn parse_detect_with_methods() {
        let cli = Cli::parse_from(["converge", "detect", "git", "--method", "command,file"]);
        assert!(
            matches!(&cli.command, Command::Detect(_)),
            "Expected Detect command"
        );
        if let Command::Detect(opts) = cli.command {
            assert_eq!(opts.application, "git");
            assert_eq!(
                opts.method,
                vec![DetectionMethod::Command, DetectionMethod::File]
            );
        }
    }

    #[test]
    fn parse_detect_rejects_unknown_method() {
        let result = Cli::try_parse_from(["converge", "detect", "git", "--method", "registry"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["converge", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["converge", "-v", "apply"]);
        assert!(cli.verbose);
    }

    #[test]
    fn parallel_is_enabled_by_default() {
        let cli = Cli::parse_from(["converge", "apply"]);
        assert!(cli.global.parallel, "parallel should be true by default");
    }

    #[test]
    fn no_parallel_disables_parallel() {
        let cli = Cli::parse_from(["converge", "--no-parallel", "apply"]);
        assert!(
            !cli.global.parallel,
            "--no-parallel should set parallel to false"
        );
    }
}
