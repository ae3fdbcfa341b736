//! Command: detect one application on the host.
use std::io::Write as _;

use anyhow::Result;

use super::system_detector;
use crate::cli::DetectOpts;
use crate::logging::Log;
use crate::platform::PlatformContext;
use crate::resources::detect::{DetectionMethod, DetectionResult};

/// Run the detect command.
///
/// # Errors
///
/// Returns an error if the application is not installed, so scripts can
/// branch on the exit status.
pub fn run(opts: &DetectOpts, log: &dyn Log) -> Result<()> {
    let platform = PlatformContext::detect();
    let methods = if opts.method.is_empty() {
        DetectionMethod::ALL.to_vec()
    } else {
        opts.method.clone()
    };

    log.debug(&format!(
        "detecting {} on {} via {}",
        opts.application,
        platform.os.as_str(),
        methods
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    let result = system_detector().detect(&opts.application, &methods, &platform);

    let mut out = std::io::stdout().lock();
    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        writeln!(out, "{}", describe(&opts.application, &result))?;
    }

    if !result.installed {
        anyhow::bail!("{} is not installed", opts.application);
    }
    Ok(())
}

/// One-line human description of a detection result.
#[must_use]
pub fn describe(app: &str, result: &DetectionResult) -> String {
    if !result.installed {
        return format!("{app}: not installed");
    }
    let mut line = format!("{app}: {} (via {})", result.version, result.method);
    if !result.installation_path.is_empty() {
        line.push_str(" at ");
        line.push_str(&result.installation_path);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_missing_application() {
        assert_eq!(
            describe("nvim", &DetectionResult::not_found()),
            "nvim: not installed"
        );
    }

    #[test]
    fn describe_found_application_with_path() {
        let result = DetectionResult {
            installed: true,
            version: "2.43.0".to_string(),
            installation_path: "/usr/bin/git".to_string(),
            method: "command".to_string(),
        };
        assert_eq!(
            describe("git", &result),
            "git: 2.43.0 (via command) at /usr/bin/git"
        );
    }

    #[test]
    fn describe_disabled_detection_omits_path() {
        let line = describe("code", &DetectionResult::disabled());
        assert!(line.starts_with("code: "));
        assert!(line.ends_with("(via disabled)"));
    }
}
