//! Command: print version information.
use std::io::Write as _;

use anyhow::Result;

/// Version string: `CONVERGE_VERSION` at build time, else the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("CONVERGE_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the converge version to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run() -> Result<()> {
    writeln!(std::io::stdout().lock(), "converge {}", version())?;
    Ok(())
}
