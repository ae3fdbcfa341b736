//! Permission enforcement on deployed targets.
//!
//! Failures here never abort a resource: every problem is reported as a
//! warning diagnostic and the deploy stands.
use std::path::Path;

use thiserror::Error;

use super::outcome::Diagnostic;

/// A mode string that is not a valid octal permission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid octal mode '{0}' (expected up to four octal digits, at most 7777)")]
pub struct InvalidMode(pub String);

/// Parse an octal mode such as `"644"`, `"0755"` or `"0o600"`.
///
/// # Errors
///
/// Returns [`InvalidMode`] for empty input, non-octal digits or values
/// above `7777`.
pub fn parse_mode(raw: &str) -> Result<u32, InvalidMode> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| (b'0'..=b'7').contains(&b))
    {
        return Err(InvalidMode(raw.to_string()));
    }
    u32::from_str_radix(digits, 8).map_err(|_| InvalidMode(raw.to_string()))
}

/// Requested modes for a deployed target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeRequest {
    /// Mode for files.
    pub file_mode: Option<u32>,
    /// Mode for directories.
    pub dir_mode: Option<u32>,
    /// Walk the whole tree.
    pub recursive: bool,
}

impl ModeRequest {
    /// Parse both mode strings.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidMode`].
    pub fn parse(
        file_mode: Option<&str>,
        dir_mode: Option<&str>,
        recursive: bool,
    ) -> Result<Self, InvalidMode> {
        Ok(Self {
            file_mode: file_mode.map(parse_mode).transpose()?,
            dir_mode: dir_mode.map(parse_mode).transpose()?,
            recursive,
        })
    }

    /// No mode requested.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.file_mode.is_none() && self.dir_mode.is_none()
    }
}

/// What [`apply_mode`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeReport {
    /// Octal mode of the root path afterwards (or as it would be).
    pub applied_mode: Option<String>,
    /// Per-path problems.
    pub diagnostics: Vec<Diagnostic>,
}

/// Format a mode the way `chmod` accepts it.
#[must_use]
pub fn format_mode(mode: u32) -> String {
    format!("{:03o}", mode & 0o7777)
}

/// Apply `request` to `path`, following a symlink at `path` itself.
///
/// Directories get `dir_mode`, files get `file_mode`; with `recursive` the
/// whole tree is walked, skipping symlinks inside it.  Entries already at
/// the requested mode are left alone.
#[must_use]
pub fn apply_mode(path: &Path, request: &ModeRequest, dry_run: bool) -> ModeReport {
    #[cfg(unix)]
    {
        unix::apply(path, request, dry_run)
    }

    #[cfg(not(unix))]
    {
        let _ = (path, dry_run);
        ModeReport {
            applied_mode: None,
            diagnostics: if request.is_empty() {
                Vec::new()
            } else {
                vec![Diagnostic::warning(
                    "file modes are not supported on this platform; skipping",
                )]
            },
        }
    }
}

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::{Diagnostic, ModeReport, ModeRequest, format_mode};

    fn current_mode(path: &Path) -> Option<u32> {
        std::fs::metadata(path)
            .ok()
            .map(|m| m.permissions().mode() & 0o7777)
    }

    pub(super) fn apply(path: &Path, request: &ModeRequest, dry_run: bool) -> ModeReport {
        let mut report = ModeReport::default();

        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) if dry_run => {
                // Target will only exist after the deploy
                let predicted = request.file_mode.or(request.dir_mode);
                if let Some(mode) = predicted {
                    report.diagnostics.push(Diagnostic::info(format!(
                        "would set mode {} on {}",
                        format_mode(mode),
                        path.display()
                    )));
                }
                report.applied_mode = predicted.map(format_mode);
                return report;
            }
            Err(e) => {
                if !request.is_empty() {
                    report.diagnostics.push(Diagnostic::warning(format!(
                        "cannot read permissions of {}: {e}",
                        path.display()
                    )));
                }
                return report;
            }
        };

        let root_mode = if meta.is_dir() {
            request.dir_mode
        } else {
            request.file_mode
        };
        let mut walker = Walker {
            request,
            dry_run,
            changed: 0,
            diagnostics: Vec::new(),
        };
        if let Some(mode) = root_mode {
            walker.enforce(path, mode);
        }
        if meta.is_dir() && request.recursive && !request.is_empty() {
            walker.walk(path);
        }

        if walker.changed > 0 {
            let verb = if dry_run { "would update" } else { "updated" };
            walker.diagnostics.push(Diagnostic::info(format!(
                "{verb} permissions on {} entr{} under {}",
                walker.changed,
                if walker.changed == 1 { "y" } else { "ies" },
                path.display()
            )));
        }
        report.diagnostics = walker.diagnostics;
        report.applied_mode = if dry_run {
            root_mode.or_else(|| current_mode(path)).map(format_mode)
        } else {
            current_mode(path).map(format_mode)
        };
        report
    }

    struct Walker<'a> {
        request: &'a ModeRequest,
        dry_run: bool,
        changed: usize,
        diagnostics: Vec<Diagnostic>,
    }

    impl Walker<'_> {
        fn enforce(&mut self, path: &Path, mode: u32) {
            let Some(current) = current_mode(path) else {
                self.diagnostics.push(Diagnostic::warning(format!(
                    "cannot read permissions of {}",
                    path.display()
                )));
                return;
            };
            if current == mode {
                return;
            }
            self.changed += 1;
            if self.dry_run {
                return;
            }
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
                self.changed -= 1;
                self.diagnostics.push(Diagnostic::warning(format!(
                    "chmod {} {} failed: {e}",
                    format_mode(mode),
                    path.display()
                )));
            }
        }

        fn walk(&mut self, dir: &Path) {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.diagnostics.push(Diagnostic::warning(format!(
                        "cannot list {}: {e}",
                        dir.display()
                    )));
                    return;
                }
            };
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                let path = entry.path();
                if file_type.is_symlink() {
                    continue;
                }
                if file_type.is_dir() {
                    if let Some(mode) = self.request.dir_mode {
                        self.enforce(&path, mode);
                    }
                    self.walk(&path);
                } else if let Some(mode) = self.request.file_mode {
                    self.enforce(&path, mode);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_accepts_octal_forms() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert_eq!(parse_mode("7777").unwrap(), 0o7777);
        assert_eq!(parse_mode("0").unwrap(), 0);
    }

    #[test]
    fn parse_mode_rejects_invalid() {
        for bad in ["", "abc", "800", "10000", "64 4", "-644"] {
            assert!(parse_mode(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn mode_request_reports_first_invalid() {
        let err = ModeRequest::parse(Some("644"), Some("9"), true).unwrap_err();
        assert_eq!(err, InvalidMode("9".to_string()));
    }

    #[test]
    fn format_mode_pads_to_three_digits() {
        assert_eq!(format_mode(0o644), "644");
        assert_eq!(format_mode(0o70), "070");
        assert_eq!(format_mode(0o4755), "4755");
    }

    #[test]
    fn empty_request_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let report = apply_mode(dir.path(), &ModeRequest::default(), false);
        assert!(report.diagnostics.is_empty());
    }

    #[cfg(unix)]
    mod unix_behaviour {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;

        fn mode_of(path: &Path) -> u32 {
            std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
        }

        fn set(path: &Path, mode: u32) {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }

        #[test]
        fn applies_file_mode() {
            let dir = tempfile::tempdir().unwrap();
            let file = dir.path().join("f");
            std::fs::write(&file, "x").unwrap();
            set(&file, 0o644);

            let request = ModeRequest::parse(Some("600"), None, false).unwrap();
            let report = apply_mode(&file, &request, false);

            assert_eq!(mode_of(&file), 0o600);
            assert_eq!(report.applied_mode.as_deref(), Some("600"));
            assert!(
                report
                    .diagnostics
                    .iter()
                    .all(|d| d.severity == crate::resources::outcome::Severity::Info)
            );
        }

        #[test]
        fn already_correct_mode_is_silent() {
            let dir = tempfile::tempdir().unwrap();
            let file = dir.path().join("f");
            std::fs::write(&file, "x").unwrap();
            set(&file, 0o600);

            let request = ModeRequest::parse(Some("600"), None, false).unwrap();
            let report = apply_mode(&file, &request, false);
            assert!(report.diagnostics.is_empty());
        }

        #[test]
        fn recursive_applies_file_and_dir_modes_separately() {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("tree");
            std::fs::create_dir_all(root.join("sub")).unwrap();
            std::fs::write(root.join("a"), "a").unwrap();
            std::fs::write(root.join("sub/b"), "b").unwrap();

            let request = ModeRequest::parse(Some("640"), Some("750"), true).unwrap();
            let _ = apply_mode(&root, &request, false);

            assert_eq!(mode_of(&root), 0o750);
            assert_eq!(mode_of(&root.join("sub")), 0o750);
            assert_eq!(mode_of(&root.join("a")), 0o640);
            assert_eq!(mode_of(&root.join("sub/b")), 0o640);
        }

        #[test]
        fn non_recursive_touches_only_root() {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("tree");
            std::fs::create_dir(&root).unwrap();
            std::fs::write(root.join("a"), "a").unwrap();
            set(&root.join("a"), 0o644);

            let request = ModeRequest::parse(Some("600"), Some("700"), false).unwrap();
            let _ = apply_mode(&root, &request, false);

            assert_eq!(mode_of(&root), 0o700);
            assert_eq!(mode_of(&root.join("a")), 0o644);
        }

        #[test]
        fn recursive_walk_skips_inner_symlinks() {
            let dir = tempfile::tempdir().unwrap();
            let outside = dir.path().join("outside");
            std::fs::write(&outside, "o").unwrap();
            set(&outside, 0o644);
            let root = dir.path().join("tree");
            std::fs::create_dir(&root).unwrap();
            std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

            let request = ModeRequest::parse(Some("600"), None, true).unwrap();
            let _ = apply_mode(&root, &request, false);

            assert_eq!(mode_of(&outside), 0o644, "link target must be untouched");
        }

        #[test]
        fn dry_run_does_not_change_modes() {
            let dir = tempfile::tempdir().unwrap();
            let file = dir.path().join("f");
            std::fs::write(&file, "x").unwrap();
            set(&file, 0o644);

            let request = ModeRequest::parse(Some("600"), None, false).unwrap();
            let report = apply_mode(&file, &request, true);

            assert_eq!(mode_of(&file), 0o644);
            assert_eq!(report.applied_mode.as_deref(), Some("600"));
        }

        #[test]
        fn dry_run_on_missing_path_predicts_mode() {
            let dir = tempfile::tempdir().unwrap();
            let request = ModeRequest::parse(Some("600"), None, false).unwrap();
            let report = apply_mode(&dir.path().join("later"), &request, true);
            assert_eq!(report.applied_mode.as_deref(), Some("600"));
            assert_eq!(report.diagnostics.len(), 1);
        }

        #[test]
        fn missing_path_is_a_warning() {
            let dir = tempfile::tempdir().unwrap();
            let request = ModeRequest::parse(Some("600"), None, false).unwrap();
            let report = apply_mode(&dir.path().join("gone"), &request, false);
            assert_eq!(report.diagnostics.len(), 1);
            assert!(report.diagnostics[0].message.contains("cannot read"));
        }
    }
}
