//! External command execution behind an injectable seam.
//!
//! Application detection shells out to `which`, `--version`, package
//! managers and `defaults`.  Everything goes through [`Executor`] so the
//! detector can be exercised with canned responses.

use anyhow::{Context as _, Result, bail};
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution and `PATH` lookup.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its output. Fails if the command exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command, allowing failure (returns result without bailing).
    ///
    /// # Errors
    ///
    /// Returns an error only if the process cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Locate `program` on `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;
}

/// Production [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(program: &str, args: &[&str]) -> Command {
        let mut cmd = Command::new(program);
        // Detection queries must never block on a prompt
        cmd.args(args).stdin(Stdio::null());
        cmd
    }
}

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            bail!(
                "{program} failed (exit {}): {}",
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Self::command(program, args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Scripted [`Executor`] for unit tests.
///
/// Responses are keyed by the full command line (`"brew list --cask
/// --versions firefox"`).  Unscripted commands fail to spawn, mirroring a
/// missing binary.  Every invocation is recorded for later inspection.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockExecutor {
    on_path: std::collections::HashMap<String, PathBuf>,
    responses: std::collections::HashMap<String, ExecResult>,
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockExecutor {
    /// Create an executor with no scripted programs or responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `program` resolvable through [`Executor::which`].
    #[must_use]
    pub fn with_program(mut self, program: &str, path: impl Into<PathBuf>) -> Self {
        self.on_path.insert(program.to_string(), path.into());
        self
    }

    /// Script a successful response for `command_line`.
    #[must_use]
    pub fn with_output(self, command_line: &str, stdout: &str) -> Self {
        self.with_result(command_line, true, stdout)
    }

    /// Script a response with an explicit exit status.
    #[must_use]
    pub fn with_result(mut self, command_line: &str, success: bool, stdout: &str) -> Self {
        self.responses.insert(
            command_line.to_string(),
            ExecResult {
                stdout: stdout.to_string(),
                stderr: String::new(),
                success,
                code: Some(i32::from(!success)),
            },
        );
        self
    }

    /// Command lines issued so far, in order.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mock calls poisoned").clone()
    }

    #[allow(clippy::expect_used)]
    fn lookup(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls
            .lock()
            .expect("mock calls poisoned")
            .push(line.clone());
        self.responses
            .get(&line)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("mock: no response scripted for `{line}`"))
    }
}

#[cfg(test)]
impl Executor for MockExecutor {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let result = self.lookup(program, args)?;
        if !result.success {
            bail!("{program} failed");
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.lookup(program, args)
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        self.on_path.get(program).cloned()
    }
}
