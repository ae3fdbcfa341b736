//! Non-fatal configuration checks run after loading.
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::platform::PlatformContext;
use crate::resources::ManagedResource;
use crate::resources::paths::{PathResolver, PathVars};

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The check that produced it (e.g., "targets", "sources").
    pub source: String,
    /// The resource that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Build a warning for `item` reported by `source`.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// Trait for configuration validators.
pub trait ConfigValidator {
    /// Validate the configuration and return any warnings found.
    fn validate(&self, platform: &PlatformContext) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator.
    fn name(&self) -> &'static str;
}

/// Flags resources that resolve to the same target path.
///
/// Two resources writing one path race each other; the later one wins.
#[derive(Debug)]
pub struct TargetValidator<'a> {
    resources: &'a [ManagedResource],
}

impl<'a> TargetValidator<'a> {
    /// Validate target paths of `resources`.
    #[must_use]
    pub const fn new(resources: &'a [ManagedResource]) -> Self {
        Self { resources }
    }
}

impl ConfigValidator for TargetValidator<'_> {
    fn validate(&self, platform: &PlatformContext) -> Vec<ValidationWarning> {
        let resolver = PathResolver::new(platform);
        let mut seen: BTreeMap<PathBuf, &str> = BTreeMap::new();
        let mut warnings = Vec::new();

        for resource in self.resources {
            let app = resource
                .gate
                .as_ref()
                .map_or(resource.id.as_str(), |g| g.application.as_str());
            let target = match resolver.resolve(&resource.target, &PathVars::app(app)) {
                Ok(path) => path,
                Err(err) => {
                    let message = err.to_string();
                    warnings.push(ValidationWarning::new(self.name(), &resource.id, message));
                    continue;
                }
            };
            if let Some(first) = seen.get(&target) {
                warnings.push(ValidationWarning::new(
                    self.name(),
                    &resource.id,
                    format!("target {} is also declared by '{first}'", target.display()),
                ));
            } else {
                seen.insert(target, &resource.id);
            }
        }

        warnings
    }

    fn name(&self) -> &'static str {
        "targets"
    }
}

/// Flags resources whose source does not exist yet.
///
/// Fatal only at deploy time; a source may be generated between load and
/// apply.
#[derive(Debug)]
pub struct SourceValidator<'a> {
    resources: &'a [ManagedResource],
}

impl<'a> SourceValidator<'a> {
    /// Validate source paths of `resources`.
    #[must_use]
    pub const fn new(resources: &'a [ManagedResource]) -> Self {
        Self { resources }
    }
}

impl ConfigValidator for SourceValidator<'_> {
    fn validate(&self, _platform: &PlatformContext) -> Vec<ValidationWarning> {
        self.resources
            .iter()
            .filter(|r| !r.source.exists())
            .map(|r| {
                ValidationWarning::new(
                    self.name(),
                    &r.id,
                    format!("source does not exist: {}", r.source.display()),
                )
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "sources"
    }
}

/// Run every validator over `resources`.
#[must_use]
pub fn validate_all(
    resources: &[ManagedResource],
    platform: &PlatformContext,
) -> Vec<ValidationWarning> {
    let validators: [&dyn ConfigValidator; 2] = [
        &TargetValidator::new(resources),
        &SourceValidator::new(resources),
    ];
    validators
        .iter()
        .flat_map(|v| v.validate(platform))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::platform::Os;
    use crate::resources::{ApplicationGate, Strategy};

    fn platform() -> PlatformContext {
        PlatformContext::with_home(Os::Linux, "/home/u")
    }

    #[test]
    fn duplicate_targets_are_reported_once_per_extra() {
        let resources = vec![
            ManagedResource::new("a", "/s/a", "~/.x", Strategy::Symlink),
            ManagedResource::new("b", "/s/b", "{home}/.x", Strategy::Copy),
            ManagedResource::new("c", "/s/c", "~/.y", Strategy::Copy),
        ];
        let warnings = TargetValidator::new(&resources).validate(&platform());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].item, "b");
        assert!(warnings[0].message.contains("'a'"));
    }

    #[test]
    fn app_placeholder_uses_gate_application() {
        let mut a = ManagedResource::new("a", "/s/a", "{config}/{app}/init", Strategy::Copy);
        a.gate = Some(ApplicationGate::new("nvim"));
        let b = ManagedResource::new("nvim", "/s/b", "~/.config/nvim/init", Strategy::Copy);
        let warnings = TargetValidator::new(&[a, b]).validate(&platform());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unresolvable_target_is_a_warning() {
        let mut p = platform();
        p.config_dir = None;
        let resources = vec![ManagedResource::new("a", "/s/a", "{config}/a", Strategy::Copy)];
        let warnings = TargetValidator::new(&resources).validate(&p);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("{config}"));
    }

    #[test]
    fn missing_source_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("present");
        std::fs::write(&present, "").unwrap();
        let resources = vec![
            ManagedResource::new("ok", &present, "~/.ok", Strategy::Copy),
            ManagedResource::new("gone", tmp.path().join("gone"), "~/.gone", Strategy::Copy),
        ];
        let warnings = validate_all(&resources, &platform());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].source, "sources");
        assert_eq!(warnings[0].item, "gone");
    }
}
