// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed sandbox (home, source tree and backup
// directory) plus stub detection seams, so each integration test can run the
// reconciler against real files without probing the host.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use converge::exec::{ExecResult, Executor};
use converge::logging::Logger;
use converge::operations::FileSystemOps;
use converge::platform::{Os, PlatformContext};
use converge::resources::deploy::Deployer;
use converge::resources::detect::Detector;
use converge::resources::outcome::DeploymentOutcome;
use converge::resources::template::JinjaRenderer;
use converge::resources::{GlobalPolicy, ManagedResource};
use converge::tasks::Reconciler;

/// [`Executor`] that knows a fixed set of commands and their `--version`
/// output.  Everything else is absent from `PATH`.
#[derive(Debug, Default)]
pub struct StubExecutor {
    installed: HashMap<String, String>,
}

impl StubExecutor {
    /// Pretend `program` is on `PATH` and prints `version_output`.
    pub fn with_command(mut self, program: &str, version_output: &str) -> Self {
        self.installed
            .insert(program.to_string(), version_output.to_string());
        self
    }
}

impl Executor for StubExecutor {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            anyhow::bail!("{program} failed");
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        Ok(match self.installed.get(program) {
            Some(version) if args == ["--version"] => ExecResult {
                stdout: version.clone(),
                stderr: String::new(),
                success: true,
                code: Some(0),
            },
            _ => ExecResult {
                stdout: String::new(),
                stderr: format!("{program}: not found"),
                success: false,
                code: Some(127),
            },
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        self.installed
            .contains_key(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

/// [`FileSystemOps`] in which no install location exists.
#[derive(Debug, Default)]
pub struct EmptyFileSystem;

impl FileSystemOps for EmptyFileSystem {
    fn exists(&self, _path: &Path) -> bool {
        false
    }

    fn is_dir(&self, _path: &Path) -> bool {
        false
    }
}

/// An isolated convergence sandbox backed by a [`tempfile::TempDir`].
///
/// Layout: `home/` is the platform home, `src/` holds resource sources and
/// `backups/` is the default backup directory.
pub struct Sandbox {
    pub root: tempfile::TempDir,
    pub platform: Arc<PlatformContext>,
    pub policy: GlobalPolicy,
    pub reconciler: Reconciler,
    pub log: Arc<Logger>,
}

impl Sandbox {
    /// A Linux sandbox where no application is installed.
    pub fn new() -> Self {
        SandboxBuilder::new().build()
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    pub fn src(&self) -> PathBuf {
        self.root.path().join("src")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.path().join("backups")
    }

    /// Write a source file under `src/` and return its absolute path.
    pub fn source(&self, name: &str, content: &str) -> PathBuf {
        write(&self.src().join(name), content)
    }

    /// Write a pre-existing file under `home/` and return its absolute path.
    pub fn existing(&self, name: &str, content: &str) -> PathBuf {
        write(&self.home().join(name), content)
    }

    pub fn run(&self, resource: &ManagedResource) -> DeploymentOutcome {
        self.reconciler
            .reconcile(resource, &self.policy, self.log.as_ref())
    }

    pub fn run_with(&self, resource: &ManagedResource, policy: &GlobalPolicy) -> DeploymentOutcome {
        self.reconciler.reconcile(resource, policy, self.log.as_ref())
    }

    /// Every file in the default backup directory, sorted.
    pub fn backups(&self) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = std::fs::read_dir(self.backup_dir())
            .map(|rd| rd.flatten().map(|e| e.path()).collect())
            .unwrap_or_default();
        found.sort();
        found
    }
}

/// Fluent builder for [`Sandbox`].
pub struct SandboxBuilder {
    executor: StubExecutor,
    detection: bool,
}

impl SandboxBuilder {
    pub fn new() -> Self {
        Self {
            executor: StubExecutor::default(),
            detection: true,
        }
    }

    /// Make `program` detectable by command lookup.
    pub fn with_command(mut self, program: &str, version_output: &str) -> Self {
        self.executor = self.executor.with_command(program, version_output);
        self
    }

    pub fn detection(mut self, enabled: bool) -> Self {
        self.detection = enabled;
        self
    }

    pub fn build(self) -> Sandbox {
        let root = tempfile::tempdir().expect("create temp dir");
        let home = root.path().join("home");
        std::fs::create_dir_all(&home).expect("create home");
        std::fs::create_dir_all(root.path().join("src")).expect("create src");

        let platform = Arc::new(PlatformContext::with_home(Os::Linux, &home));
        let detector = Detector::new(Arc::new(self.executor), Arc::new(EmptyFileSystem))
            .enabled(self.detection);
        let deployer = Deployer::new(Arc::new(JinjaRenderer::new()));
        let reconciler = Reconciler::new(Arc::clone(&platform), detector, deployer);
        let policy = GlobalPolicy::new(root.path().join("backups"));

        Sandbox {
            root,
            platform,
            policy,
            reconciler,
            log: Arc::new(Logger::with_log_file(None)),
        }
    }
}

/// Write `content` to `path`, creating parent directories.
pub fn write(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write file");
    path.to_path_buf()
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}
