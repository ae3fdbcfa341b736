//! Declarative, idempotent file convergence.
//!
//! Each declared [`ManagedResource`](resources::ManagedResource) names a
//! source in the user's dotfiles tree and a target on the local
//! filesystem.  Reconciling it detects the owning application, resolves the
//! target path, settles any conflict with an existing file, backs that file
//! up, deploys the source (symlink, copy or rendered template) and enforces
//! permissions.  Running it twice changes nothing the second time.
//!
//! The public API is organised into four layers:
//!
//! - **[`config`]**: load `converge.toml` into validated resources and policy
//! - **[`resources`]**: the reconciliation primitives (detect, resolve,
//!   resolve conflicts, back up, deploy, chmod)
//! - **[`tasks`]**: the per-resource state machine and the parallel driver
//! - **[`commands`]**: subcommand orchestration (`apply`, `plan`, `detect`)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod operations;
pub mod platform;
pub mod resources;
pub mod sync;
pub mod tasks;
