//! Template context composition and the rendering seam.
//!
//! [`TemplateRenderer`] is the only thing the deployer knows about
//! templating.  [`JinjaRenderer`] is the production implementation on
//! `minijinja` with strict undefined handling, so a template referencing a
//! missing variable fails instead of silently rendering an empty string.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use minijinja::value::Rest;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use super::Variables;
use crate::platform::PlatformContext;

/// Key under which platform facts are exposed to templates.
pub const SYSTEM_KEY: &str = "system";

/// Variables visible to a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TemplateContext {
    values: Map<String, Value>,
}

impl TemplateContext {
    /// Layer user variables, platform facts and the platform overlay.
    ///
    /// Order of precedence, lowest first: `user`, the `system` map, then the
    /// overlay keyed by the current platform name.  A user variable named
    /// `system` is therefore shadowed.
    #[must_use]
    pub fn compose(
        user: &Variables,
        platform: &PlatformContext,
        overlays: &BTreeMap<String, Variables>,
    ) -> Self {
        let mut values: Map<String, Value> = user
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let dir = |p: Option<&std::path::Path>| p.map(|p| p.display().to_string());
        values.insert(
            SYSTEM_KEY.to_string(),
            json!({
                "platform": platform.os.as_str(),
                "arch": platform.arch,
                "home_dir": dir(platform.home()),
                "config_dir": dir(platform.config_dir()),
                "app_support_dir": dir(platform.app_support_dir()),
            }),
        );

        let overlay = overlays.iter().find(|(key, _)| {
            crate::platform::Os::from_key(key).is_some_and(|os| os == platform.os)
        });
        if let Some((_, overlay)) = overlay {
            for (k, v) in overlay {
                values.insert(k.clone(), v.clone());
            }
        }
        Self { values }
    }

    /// Value bound to `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All bindings.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// A renderer rejected a template.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Renders template text against a context.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateRenderer: Send + Sync {
    /// Render `text`; `name` identifies the template in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] on syntax errors, undefined variables or
    /// failing functions.
    fn render(&self, name: &str, text: &str, context: &TemplateContext)
    -> Result<String, RenderError>;
}

/// A named function callable from templates with string arguments.
pub type TemplateFunction = Arc<dyn Fn(&[String]) -> Result<String, String> + Send + Sync>;

/// [`TemplateRenderer`] on `minijinja`.
#[derive(Clone, Default)]
pub struct JinjaRenderer {
    functions: BTreeMap<String, TemplateFunction>,
}

impl fmt::Debug for JinjaRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JinjaRenderer")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl JinjaRenderer {
    /// Renderer with no custom functions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name`.
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[String]) -> Result<String, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        for (name, function) in &self.functions {
            let function = Arc::clone(function);
            env.add_function(name.clone(), move |args: Rest<String>| {
                function(&args.0)
                    .map_err(|msg| minijinja::Error::new(ErrorKind::InvalidOperation, msg))
            });
        }
        env
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(
        &self,
        name: &str,
        text: &str,
        context: &TemplateContext,
    ) -> Result<String, RenderError> {
        self.environment()
            .render_named_str(name, text, context.as_map())
            .map_err(|e| RenderError(format!("{e:#}")))
    }
}
