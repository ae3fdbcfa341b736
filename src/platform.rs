//! Host platform facts consumed by detection, path expansion and templating.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Detected operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Linux and other Unix-likes.
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
}

impl Os {
    /// The operating system this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            // Other Unix-like systems behave like Linux for our purposes
            Self::Linux
        }
    }

    /// Lowercase identifier used in config keys and template variables.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }

    /// Parse a platform key as written in config files.
    ///
    /// Accepts `darwin` as an alias for macOS.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "linux" => Some(Self::Linux),
            "macos" | "darwin" => Some(Self::MacOs),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform information for the current system.
///
/// Directory fields are `None` when the OS cannot report them (e.g. `$HOME`
/// unset in a service context); consumers surface that as a resolution error
/// only when a path actually needs the missing directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformContext {
    /// Detected operating system.
    pub os: Os,
    /// CPU architecture as reported by `std::env::consts::ARCH`.
    pub arch: String,
    /// User home directory.
    pub home: Option<PathBuf>,
    /// Per-user configuration directory.
    pub config_dir: Option<PathBuf>,
    /// Per-user application support directory.
    pub app_support_dir: Option<PathBuf>,
}

impl PlatformContext {
    /// Detect the current platform and its well-known directories.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            os: Os::current(),
            arch: std::env::consts::ARCH.to_string(),
            home: dirs::home_dir(),
            config_dir: dirs::config_dir(),
            app_support_dir: dirs::data_dir(),
        }
    }

    /// Build a context rooted at an explicit home directory.
    ///
    /// The config and application-support directories follow the layout
    /// conventions of `os` beneath `home`.  Used by tests and by callers that
    /// sandbox the whole run under a scratch directory.
    #[must_use]
    pub fn with_home(os: Os, home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let (config_dir, app_support_dir) = match os {
            Os::Linux => (home.join(".config"), home.join(".local").join("share")),
            Os::MacOs => {
                let support = home.join("Library").join("Application Support");
                (support.clone(), support)
            }
            Os::Windows => {
                let roaming = home.join("AppData").join("Roaming");
                (roaming.clone(), roaming)
            }
        };
        Self {
            os,
            arch: std::env::consts::ARCH.to_string(),
            home: Some(home),
            config_dir: Some(config_dir),
            app_support_dir: Some(app_support_dir),
        }
    }

    /// Home directory, if known.
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Configuration directory, if known.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Application support directory, if known.
    pub fn app_support_dir(&self) -> Option<&Path> {
        self.app_support_dir.as_deref()
    }

    /// `true` on macOS.
    pub fn is_macos(&self) -> bool {
        self.os == Os::MacOs
    }

    /// `true` on Windows.
    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }

    /// `true` on Linux.
    pub fn is_linux(&self) -> bool {
        self.os == Os::Linux
    }
}
