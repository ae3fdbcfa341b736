//! Application detection and version gating.
//!
//! [`Detector`] inspects the host through several independent methods tried
//! in caller order; the first positive hit wins.  Probes never fail: a
//! broken `brew`, an unreadable `/Applications` or a command that hangs up
//! without output all degrade to "not found by this method".
//!
//! [`evaluate_gate`] turns a [`DetectionResult`] into a [`GateVerdict`]
//! according to an [`ApplicationGate`]'s version bounds and missing-app
//! policy.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::ApplicationGate;
use crate::exec::Executor;
use crate::operations::FileSystemOps;
use crate::platform::{Os, PlatformContext};

/// Placeholder version when an application is present but its version is not.
pub const UNKNOWN_VERSION: &str = "unknown";

/// One way of discovering an installed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Executable on `PATH`.
    Command,
    /// Well-known installation locations.
    File,
    /// Homebrew cask (macOS).
    BrewCask,
    /// The platform's native package manager.
    PackageManager,
}

impl DetectionMethod {
    /// All methods in the default probing order.
    pub const ALL: [Self; 4] = [
        Self::Command,
        Self::File,
        Self::BrewCask,
        Self::PackageManager,
    ];

    /// Name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::File => "file",
            Self::BrewCask => "brew_cask",
            Self::PackageManager => "package_manager",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "unknown detection method '{s}' (expected one of: command, file, brew_cask, package_manager)"
                )
            })
    }
}

/// What detection found about one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionResult {
    /// Whether any method found the application.
    pub installed: bool,
    /// Version string, empty when unknown.
    pub version: String,
    /// Where the application was found.
    pub installation_path: String,
    /// The method that succeeded, `not_found`, or `disabled`.
    pub method: String,
}

impl DetectionResult {
    /// `method` when nothing was found.
    pub const METHOD_NOT_FOUND: &'static str = "not_found";
    /// `method` when detection is switched off.
    pub const METHOD_DISABLED: &'static str = "disabled";

    /// No method found the application.
    #[must_use]
    pub fn not_found() -> Self {
        Self {
            installed: false,
            version: String::new(),
            installation_path: String::new(),
            method: Self::METHOD_NOT_FOUND.to_string(),
        }
    }

    /// Detection is switched off; the application is assumed present.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            installed: true,
            version: UNKNOWN_VERSION.to_string(),
            installation_path: String::new(),
            method: Self::METHOD_DISABLED.to_string(),
        }
    }

    fn found(method: DetectionMethod, version: Option<String>, path: impl Into<String>) -> Self {
        Self {
            installed: true,
            version: version.unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            installation_path: path.into(),
            method: method.as_str().to_string(),
        }
    }

    /// Whether the result came from a disabled detector.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.method == Self::METHOD_DISABLED
    }
}

/// Probes the host for installed applications.
#[derive(Debug, Clone)]
pub struct Detector {
    executor: Arc<dyn Executor>,
    fs: Arc<dyn FileSystemOps>,
    enabled: bool,
}

impl Detector {
    /// Detector probing through `executor` and `fs`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>, fs: Arc<dyn FileSystemOps>) -> Self {
        Self {
            executor,
            fs,
            enabled: true,
        }
    }

    /// Switch detection on or off.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether detection is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Detect `app` by trying `methods` in order.
    #[must_use]
    pub fn detect(
        &self,
        app: &str,
        methods: &[DetectionMethod],
        platform: &PlatformContext,
    ) -> DetectionResult {
        if !self.enabled {
            return DetectionResult::disabled();
        }
        methods
            .iter()
            .find_map(|&method| self.try_method(method, app, platform))
            .unwrap_or_else(DetectionResult::not_found)
    }

    fn try_method(
        &self,
        method: DetectionMethod,
        app: &str,
        platform: &PlatformContext,
    ) -> Option<DetectionResult> {
        let result = match method {
            DetectionMethod::Command => self.by_command(app),
            DetectionMethod::File => self.by_file(app, platform),
            DetectionMethod::BrewCask => self.by_brew_cask(app, platform),
            DetectionMethod::PackageManager => self.by_package_manager(app, platform),
        };
        if let Some(found) = &result {
            tracing::debug!(app, %method, version = %found.version, "application detected");
        }
        result
    }

    fn by_command(&self, app: &str) -> Option<DetectionResult> {
        let path = self.executor.which(app)?;
        let version = self
            .executor
            .run_unchecked(app, &["--version"])
            .ok()
            .and_then(|out| extract_version(&out.stdout).or_else(|| extract_version(&out.stderr)));
        Some(DetectionResult::found(
            DetectionMethod::Command,
            version,
            path.display().to_string(),
        ))
    }

    fn by_file(&self, app: &str, platform: &PlatformContext) -> Option<DetectionResult> {
        let path = install_locations(app, platform.os)
            .into_iter()
            .find(|p| self.fs.exists(p))?;
        let version = if platform.is_macos() && path.extension().is_some_and(|e| e == "app") {
            self.bundle_version(&path)
        } else {
            None
        };
        Some(DetectionResult::found(
            DetectionMethod::File,
            version,
            path.display().to_string(),
        ))
    }

    fn bundle_version(&self, bundle: &std::path::Path) -> Option<String> {
        let info = bundle.join("Contents").join("Info");
        let info = info.to_str()?;
        let out = self
            .executor
            .run_unchecked("defaults", &["read", info, "CFBundleShortVersionString"])
            .ok()?;
        let version = out.stdout.trim();
        (out.success && !version.is_empty()).then(|| version.to_string())
    }

    fn by_brew_cask(&self, app: &str, platform: &PlatformContext) -> Option<DetectionResult> {
        if !platform.is_macos() {
            return None;
        }
        self.executor.which("brew")?;
        let out = self
            .executor
            .run_unchecked("brew", &["list", "--cask", "--versions", app])
            .ok()?;
        if !out.success || out.stdout.trim().is_empty() {
            return None;
        }
        let bundle = PathBuf::from("/Applications").join(format!("{}.app", capitalize(app)));
        let path = if self.fs.exists(&bundle) {
            bundle.display().to_string()
        } else {
            String::new()
        };
        Some(DetectionResult::found(
            DetectionMethod::BrewCask,
            second_token(&out.stdout),
            path,
        ))
    }

    fn by_package_manager(&self, app: &str, platform: &PlatformContext) -> Option<DetectionResult> {
        let found = |version: Option<String>| {
            Some(DetectionResult::found(
                DetectionMethod::PackageManager,
                version,
                String::new(),
            ))
        };
        match platform.os {
            Os::Linux => {
                if let Some(version) = self.query_dpkg(app) {
                    return found(version);
                }
                if let Some(version) = self.query_rpm(app) {
                    return found(version);
                }
                if let Some(version) = self.query_pacman(app) {
                    return found(version);
                }
                None
            }
            Os::MacOs => {
                self.executor.which("brew")?;
                let out = self
                    .executor
                    .run_unchecked("brew", &["list", "--versions", app])
                    .ok()?;
                (out.success && !out.stdout.trim().is_empty())
                    .then(|| second_token(&out.stdout))
                    .and_then(found)
            }
            Os::Windows => {
                self.executor.which("winget")?;
                let out = self
                    .executor
                    .run_unchecked(
                        "winget",
                        &[
                            "list",
                            "--exact",
                            "--id",
                            app,
                            "--accept-source-agreements",
                            "--disable-interactivity",
                        ],
                    )
                    .ok()?;
                // winget prints a table; the exit status is the reliable signal
                (out.success && out.stdout.contains(app)).then_some(None).and_then(found)
            }
        }
    }

    /// Returns `Some(version)` when dpkg reports the package as installed.
    fn query_dpkg(&self, app: &str) -> Option<Option<String>> {
        self.executor.which("dpkg-query")?;
        let out = self
            .executor
            .run_unchecked(
                "dpkg-query",
                &["-W", "-f=${db:Status-Status} ${Version}", app],
            )
            .ok()?;
        let line = out.stdout.trim();
        let version = line.strip_prefix("installed")?;
        out.success
            .then(|| non_empty(version.trim()).map(|v| upstream_version(&v)))
    }

    fn query_rpm(&self, app: &str) -> Option<Option<String>> {
        self.executor.which("rpm")?;
        let out = self
            .executor
            .run_unchecked("rpm", &["-q", "--qf", "%{VERSION}", app])
            .ok()?;
        out.success.then(|| non_empty(out.stdout.trim()))
    }

    fn query_pacman(&self, app: &str) -> Option<Option<String>> {
        self.executor.which("pacman")?;
        let out = self.executor.run_unchecked("pacman", &["-Q", app]).ok()?;
        out.success
            .then(|| second_token(&out.stdout).map(|v| upstream_version(&v)))
    }
}

/// Candidate installation paths for `app` on `os`, most specific first.
fn install_locations(app: &str, os: Os) -> Vec<PathBuf> {
    let capitalized = capitalize(app);
    let mut names = vec![app.to_string()];
    if capitalized != app {
        names.push(capitalized);
    }
    match os {
        Os::MacOs => names
            .iter()
            .map(|n| PathBuf::from("/Applications").join(format!("{n}.app")))
            .collect(),
        Os::Linux => ["/usr/bin", "/usr/local/bin", "/opt"]
            .iter()
            .map(|dir| PathBuf::from(dir).join(app))
            .collect(),
        Os::Windows => [r"C:\Program Files", r"C:\Program Files (x86)"]
            .iter()
            .flat_map(|root| names.iter().map(move |n| PathBuf::from(root).join(n)))
            .collect(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// The version column of `name version` output (brew, pacman).
/// Strip the `epoch:` prefix and `-release` suffix of a dpkg or pacman
/// version, leaving the upstream version (`2:9.1.0016-1ubuntu7` -> `9.1.0016`).
fn upstream_version(raw: &str) -> String {
    let without_epoch = strip_epoch(raw);
    without_epoch
        .rsplit_once('-')
        .map_or(without_epoch, |(upstream, _)| upstream)
        .to_string()
}

/// `raw` without a leading `<digits>:` epoch.
fn strip_epoch(raw: &str) -> &str {
    match raw.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.chars().all(|c| c.is_ascii_digit()) => {
            rest
        }
        _ => raw,
    }
}

fn second_token(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

/// Extract the first dotted numeric token from free-form `--version` output.
///
/// ```
/// use converge::resources::detect::extract_version;
///
/// assert_eq!(extract_version("git version 2.39.3 (Apple Git-146)").as_deref(), Some("2.39.3"));
/// assert_eq!(extract_version("no digits here"), None);
/// ```
#[must_use]
pub fn extract_version(text: &str) -> Option<String> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"'))
        .map(|token| token.trim_start_matches(['v', 'V']).trim_end_matches('.'))
        .find(|token| looks_like_version(token))
        .map(str::to_string)
}

fn looks_like_version(token: &str) -> bool {
    let mut parts = token.split('.');
    let major_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
    let minor_ok = parts
        .next()
        .is_some_and(|p| p.chars().next().is_some_and(|c| c.is_ascii_digit()));
    major_ok && minor_ok
}

/// Parse a version string leniently.
///
/// Accepts a `v` prefix, a numeric `epoch:` prefix, missing minor/patch
/// components and trailing non-numeric text on the last component
/// (`2.0b4`).  Strict semver (including pre-release tags) is tried first.
#[must_use]
pub fn parse_version_lenient(raw: &str) -> Option<Version> {
    let s = raw.trim().trim_start_matches(['v', 'V']);
    let s = strip_epoch(s);
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }
    let mut nums: Vec<u64> = Vec::with_capacity(3);
    for part in s.split('.').take(3) {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        nums.push(digits.parse().ok()?);
        if digits.len() != part.len() {
            break;
        }
    }
    let component = |i: usize| nums.get(i).copied().unwrap_or(0);
    (!nums.is_empty()).then(|| Version::new(component(0), component(1), component(2)))
}

/// Outcome of checking a gate against a detection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    /// Application present and within bounds.
    Pass,
    /// Gate failed and the resource must be skipped.
    Skip(String),
    /// Gate failed; continue with a warning.
    Warn(String),
    /// Gate failed; continue silently.
    Continue(String),
}

/// Apply `gate` to `detection`.
///
/// A missing application and an out-of-bounds version are both gate
/// failures; `skip_if_missing` takes precedence over `warn_if_missing`.
#[must_use]
pub fn evaluate_gate(gate: &ApplicationGate, detection: &DetectionResult) -> GateVerdict {
    let problem = if detection.installed {
        version_problem(gate, detection)
    } else {
        Some(format!("{} is not installed", gate.application))
    };
    match problem {
        None => GateVerdict::Pass,
        Some(reason) if gate.skip_if_missing => GateVerdict::Skip(reason),
        Some(reason) if gate.warn_if_missing => GateVerdict::Warn(reason),
        Some(reason) => GateVerdict::Continue(reason),
    }
}

fn version_problem(gate: &ApplicationGate, detection: &DetectionResult) -> Option<String> {
    if gate.min_version.is_none() && gate.max_version.is_none() {
        return None;
    }
    // Disabled detection is trusted.
    if detection.is_disabled() {
        return None;
    }
    let Some(version) = parse_version_lenient(&detection.version) else {
        return Some(format!(
            "version of {} could not be determined ({})",
            gate.application, detection.version
        ));
    };
    if let Some(min) = &gate.min_version
        && version < *min
    {
        return Some(format!(
            "{} {version} is older than the required minimum {min}",
            gate.application
        ));
    }
    if let Some(max) = &gate.max_version
        && version > *max
    {
        return Some(format!(
            "{} {version} is newer than the supported maximum {max}",
            gate.application
        ));
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::exec::MockExecutor;
    use crate::operations::MockFileSystemOps;

    fn detector(exec: MockExecutor, fs: MockFileSystemOps) -> Detector {
        Detector::new(Arc::new(exec), Arc::new(fs))
    }

    fn linux() -> PlatformContext {
        PlatformContext::with_home(Os::Linux, "/home/u")
    }

    fn macos() -> PlatformContext {
        PlatformContext::with_home(Os::MacOs, "/Users/u")
    }

    // -----------------------------------------------------------------------
    // detect
    // -----------------------------------------------------------------------

    #[test]
    fn disabled_detector_assumes_installed() {
        let d = detector(MockExecutor::new(), MockFileSystemOps::new()).enabled(false);
        let r = d.detect("git", &DetectionMethod::ALL, &linux());
        assert_eq!(r, DetectionResult::disabled());
        assert!(r.installed);
        assert_eq!(r.version, "unknown");
    }

    #[test]
    fn nothing_found_yields_not_found() {
        let d = detector(MockExecutor::new(), MockFileSystemOps::new());
        let r = d.detect("git", &DetectionMethod::ALL, &linux());
        assert_eq!(r, DetectionResult::not_found());
        assert_eq!(r.version, "");
    }

    #[test]
    fn command_method_reports_path_and_version() {
        let exec = MockExecutor::new()
            .with_program("git", "/usr/bin/git")
            .with_output("git --version", "git version 2.43.0\n");
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("git", &[DetectionMethod::Command], &linux());
        assert!(r.installed);
        assert_eq!(r.method, "command");
        assert_eq!(r.version, "2.43.0");
        assert_eq!(r.installation_path, "/usr/bin/git");
    }

    #[test]
    fn command_without_version_output_is_unknown() {
        let exec = MockExecutor::new().with_program("tool", "/usr/bin/tool");
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("tool", &[DetectionMethod::Command], &linux());
        assert!(r.installed);
        assert_eq!(r.version, UNKNOWN_VERSION);
    }

    #[test]
    fn methods_are_tried_in_caller_order() {
        let exec = MockExecutor::new()
            .with_program("code", "/usr/bin/code")
            .with_output("code --version", "1.90.0\n");
        let fs = MockFileSystemOps::new().with_file("/usr/bin/code");
        let d = detector(exec, fs);

        let r = d.detect(
            "code",
            &[DetectionMethod::File, DetectionMethod::Command],
            &linux(),
        );
        assert_eq!(r.method, "file", "file was listed first");
    }

    #[test]
    fn file_method_on_linux_checks_opt() {
        let fs = MockFileSystemOps::new().with_dir("/opt/zed");
        let d = detector(MockExecutor::new(), fs);
        let r = d.detect("zed", &[DetectionMethod::File], &linux());
        assert!(r.installed);
        assert_eq!(r.installation_path, "/opt/zed");
    }

    #[test]
    fn file_method_on_macos_reads_bundle_version() {
        let exec = MockExecutor::new().with_output(
            "defaults read /Applications/Firefox.app/Contents/Info CFBundleShortVersionString",
            "128.0.3\n",
        );
        let fs = MockFileSystemOps::new().with_dir("/Applications/Firefox.app");
        let d = detector(exec, fs);
        let r = d.detect("firefox", &[DetectionMethod::File], &macos());
        assert!(r.installed);
        assert_eq!(r.version, "128.0.3");
    }

    #[test]
    fn brew_cask_only_on_macos() {
        let exec = MockExecutor::new()
            .with_program("brew", "/opt/homebrew/bin/brew")
            .with_output("brew list --cask --versions firefox", "firefox 128.0.3\n");
        let d = detector(exec, MockFileSystemOps::new());

        let on_linux = d.detect("firefox", &[DetectionMethod::BrewCask], &linux());
        assert!(!on_linux.installed);

        let on_mac = d.detect("firefox", &[DetectionMethod::BrewCask], &macos());
        assert!(on_mac.installed);
        assert_eq!(on_mac.method, "brew_cask");
        assert_eq!(on_mac.version, "128.0.3");
    }

    #[test]
    fn brew_failure_degrades_to_next_method() {
        let exec = MockExecutor::new()
            .with_program("brew", "/opt/homebrew/bin/brew")
            .with_result("brew list --cask --versions iterm2", false, "")
            .with_program("iterm2", "/usr/local/bin/iterm2");
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect(
            "iterm2",
            &[DetectionMethod::BrewCask, DetectionMethod::Command],
            &macos(),
        );
        assert_eq!(r.method, "command");
    }

    #[test]
    fn package_manager_dpkg_installed() {
        let exec = MockExecutor::new()
            .with_program("dpkg-query", "/usr/bin/dpkg-query")
            .with_output(
                "dpkg-query -W -f=${db:Status-Status} ${Version} vim",
                "installed 2:9.1.0016-1ubuntu7",
            );
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("vim", &[DetectionMethod::PackageManager], &linux());
        assert!(r.installed);
        assert_eq!(r.version, "9.1.0016");
    }

    #[test]
    fn package_manager_dpkg_not_installed_falls_through_to_pacman() {
        let exec = MockExecutor::new()
            .with_program("dpkg-query", "/usr/bin/dpkg-query")
            .with_output(
                "dpkg-query -W -f=${db:Status-Status} ${Version} vim",
                "not-installed ",
            )
            .with_program("pacman", "/usr/bin/pacman")
            .with_output("pacman -Q vim", "vim 9.1.0-1\n");
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("vim", &[DetectionMethod::PackageManager], &linux());
        assert!(r.installed);
        assert_eq!(r.version, "9.1.0");
    }

    #[test]
    fn package_versions_drop_epoch_and_release() {
        assert_eq!(upstream_version("2:9.1.0016-1ubuntu7"), "9.1.0016");
        assert_eq!(upstream_version("9.1.0-1"), "9.1.0");
        assert_eq!(upstream_version("1:2.43.0-1"), "2.43.0");
        assert_eq!(upstream_version("3.4"), "3.4");
    }

    #[test]
    fn dpkg_version_with_epoch_satisfies_minimum() {
        let exec = MockExecutor::new()
            .with_program("dpkg-query", "/usr/bin/dpkg-query")
            .with_output(
                "dpkg-query -W -f=${db:Status-Status} ${Version} vim",
                "installed 2:9.1.0016-1ubuntu7",
            );
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("vim", &[DetectionMethod::PackageManager], &linux());
        let mut gate = ApplicationGate::new("vim");
        gate.min_version = Some(Version::new(9, 0, 0));
        assert_eq!(evaluate_gate(&gate, &r), GateVerdict::Pass);
    }

    #[test]
    fn pacman_release_suffix_meets_equal_minimum() {
        let exec = MockExecutor::new()
            .with_program("pacman", "/usr/bin/pacman")
            .with_output("pacman -Q vim", "vim 9.1.0-1\n");
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("vim", &[DetectionMethod::PackageManager], &linux());
        let mut gate = ApplicationGate::new("vim");
        gate.min_version = Some(Version::new(9, 1, 0));
        assert_eq!(evaluate_gate(&gate, &r), GateVerdict::Pass);
    }

    #[test]
    fn package_manager_skips_missing_tools() {
        let exec = MockExecutor::new();
        let d = detector(exec, MockFileSystemOps::new());
        let r = d.detect("vim", &[DetectionMethod::PackageManager], &linux());
        assert!(!r.installed);
    }

    // -----------------------------------------------------------------------
    // extract_version / parse_version_lenient
    // -----------------------------------------------------------------------

    #[test]
    fn extract_version_variants() {
        assert_eq!(extract_version("Python 3.11.4").as_deref(), Some("3.11.4"));
        assert_eq!(extract_version("tmux 3.4").as_deref(), Some("3.4"));
        assert_eq!(extract_version("nvim v0.10.0\nBuild type").as_deref(), Some("0.10.0"));
        assert_eq!(extract_version("version 12"), None);
    }

    #[test]
    fn lenient_parse_fills_missing_components() {
        assert_eq!(parse_version_lenient("3.4"), Some(Version::new(3, 4, 0)));
        assert_eq!(parse_version_lenient("v2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version_lenient("9.1.0-1"), Some(Version::parse("9.1.0-1").unwrap()));
        assert_eq!(parse_version_lenient("2.0b4"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version_lenient("2:9.1.0016"), Some(Version::new(9, 1, 16)));
        assert_eq!(parse_version_lenient("unknown"), None);
        assert_eq!(parse_version_lenient(""), None);
    }

    // -----------------------------------------------------------------------
    // evaluate_gate
    // -----------------------------------------------------------------------

    fn installed(version: &str) -> DetectionResult {
        DetectionResult::found(DetectionMethod::Command, Some(version.to_string()), "/bin/x")
    }

    fn bounded_gate(min: &str, max: &str) -> ApplicationGate {
        let mut gate = ApplicationGate::new("x");
        gate.min_version = Some(Version::parse(min).unwrap());
        gate.max_version = Some(Version::parse(max).unwrap());
        gate
    }

    #[test]
    fn gate_passes_inside_inclusive_bounds() {
        let gate = bounded_gate("2.0.0", "3.0.0");
        assert_eq!(evaluate_gate(&gate, &installed("2.0.0")), GateVerdict::Pass);
        assert_eq!(evaluate_gate(&gate, &installed("3.0.0")), GateVerdict::Pass);
        assert_eq!(evaluate_gate(&gate, &installed("2.5")), GateVerdict::Pass);
    }

    #[test]
    fn gate_skips_outside_bounds() {
        let gate = bounded_gate("2.0.0", "3.0.0");
        assert!(matches!(
            evaluate_gate(&gate, &installed("1.9.9")),
            GateVerdict::Skip(reason) if reason.contains("older")
        ));
        assert!(matches!(
            evaluate_gate(&gate, &installed("3.0.1")),
            GateVerdict::Skip(reason) if reason.contains("newer")
        ));
    }

    #[test]
    fn unknown_version_fails_only_when_bounded() {
        let unbounded = ApplicationGate::new("x");
        assert_eq!(evaluate_gate(&unbounded, &installed("unknown")), GateVerdict::Pass);

        let gate = bounded_gate("1.0.0", "9.0.0");
        assert!(matches!(
            evaluate_gate(&gate, &installed("unknown")),
            GateVerdict::Skip(_)
        ));
    }

    #[test]
    fn disabled_detection_passes_bounded_gate() {
        let gate = bounded_gate("1.0.0", "2.0.0");
        assert_eq!(
            evaluate_gate(&gate, &DetectionResult::disabled()),
            GateVerdict::Pass
        );
    }

    #[test]
    fn missing_app_policy_precedence() {
        let missing = DetectionResult::not_found();

        let mut gate = ApplicationGate::new("x");
        gate.warn_if_missing = true;
        assert!(matches!(evaluate_gate(&gate, &missing), GateVerdict::Skip(_)));

        gate.skip_if_missing = false;
        assert!(matches!(evaluate_gate(&gate, &missing), GateVerdict::Warn(_)));

        gate.warn_if_missing = false;
        assert!(matches!(evaluate_gate(&gate, &missing), GateVerdict::Continue(_)));
    }

    #[test]
    fn method_from_str_round_trips_names() {
        for m in DetectionMethod::ALL {
            assert_eq!(m.as_str().parse::<DetectionMethod>().unwrap(), m);
        }
        assert!("registry".parse::<DetectionMethod>().is_err());
    }
}
