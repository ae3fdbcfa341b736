//! Subcommand orchestration and shared setup.
pub mod apply;
pub mod detect;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::validation::validate_all;
use crate::config::{CONFIG_ENV, Config, SourceLocation};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::operations::{FileSystemOps, SystemFileSystemOps};
use crate::platform::PlatformContext;
use crate::resources::deploy::Deployer;
use crate::resources::detect::Detector;
use crate::resources::template::JinjaRenderer;
use crate::resources::{GlobalPolicy, ManagedResource};
use crate::sync::{self, GitSync};
use crate::tasks::{CancelToken, Reconciler};

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates platform detection, config loading, source sync and
/// resource conversion so that each command does not have to repeat the
/// boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Detected platform.
    pub platform: Arc<PlatformContext>,
    /// Loaded configuration.
    pub config: Config,
    /// Run-wide policy derived from the configuration.
    pub policy: GlobalPolicy,
    /// Resources with sources resolved.
    pub resources: Vec<ManagedResource>,
}

impl CommandSetup {
    /// Detect the platform, load the config, and sync the source tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be located or parsed, the
    /// remote source cannot be synced, or a resource entry is invalid.
    pub fn init(global: &GlobalOpts, dry_run: bool, log: &dyn Log) -> Result<Self> {
        let platform = Arc::new(PlatformContext::detect());
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = Config::locate(global.config.as_deref(), from_env, &platform)?;

        log.stage("Loading configuration");
        let config = Config::load(&path)?;
        log.info(&format!("config: {}", path.display()));

        let location = config.source_location(&platform)?;
        if let SourceLocation::Remote {
            url,
            branch,
            checkout,
        } = &location
        {
            log.stage("Syncing source");
            let auth = config
                .source
                .as_ref()
                .map(|s| s.auth.clone())
                .unwrap_or_default()
                .with_env_fallback();
            let info = sync::sync(&GitSync::new(auth), url, checkout, branch.as_deref())
                .with_context(|| format!("syncing {url}"))?;
            log.info(&format!(
                "{url} at {}",
                info.last_commit.get(..12).unwrap_or(&info.last_commit)
            ));
        }

        let policy = config.policy(&platform, dry_run)?;
        let resources = config.resources(location.root(), &policy, &platform)?;
        log.info(&format!("loaded {} resources", resources.len()));

        let warnings = validate_all(&resources, &platform);
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!(
                    "  {} [{}]: {}",
                    warning.source, warning.item, warning.message
                ));
            }
        }

        Ok(Self {
            platform,
            config,
            policy,
            resources,
        })
    }

    /// Build the production reconciler for this run.
    #[must_use]
    pub fn reconciler(&self, cancel: CancelToken) -> Reconciler {
        let detector = system_detector().enabled(self.config.settings.detection);
        let deployer = Deployer::new(Arc::new(default_renderer()));
        Reconciler::new(Arc::clone(&self.platform), detector, deployer).with_cancel(cancel)
    }
}

/// Detector backed by real processes and the real filesystem.
#[must_use]
pub fn system_detector() -> Detector {
    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let fs: Arc<dyn FileSystemOps> = Arc::new(SystemFileSystemOps);
    Detector::new(executor, fs)
}

/// Template renderer with the functions templates may call.
///
/// `env(name)` expands to the value of an environment variable, or an empty
/// string when it is unset.
#[must_use]
pub fn default_renderer() -> JinjaRenderer {
    JinjaRenderer::new().with_function("env", |args: &[String]| match args {
        [name] => Ok(std::env::var(name).unwrap_or_default()),
        _ => Err(format!("env() takes exactly one argument, got {}", args.len())),
    })
}

/// Print the summary and bail if any resource failed.
///
/// # Errors
///
/// Returns an error if one or more resources recorded a failure.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();

    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} resource(s) failed");
    }
    Ok(())
}
