//! Plugin capability trait
//!
//! A plugin is an opaque unit of work invoked once per data type, view and
//! step. It receives its own copy of the slot's current collection and a
//! [`PluginContext`], and either fails, finishes without touching the slot,
//! or hands back a replacement collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipefold_core::plugin::from_fn;
//!
//! let upper = from_fn("upper", |mut files, _ctx| async move {
//!     for file in &mut files {
//!         if let Some(text) = file.content.as_text() {
//!             file.content = text.to_uppercase().into();
//!         }
//!     }
//!     Ok(Some(files))
//! });
//! ```

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::config::{Config, DataTypeConfig};
use crate::file::FileCollection;
use crate::state::BuildState;

/// Opaque error type plugins fail with
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What a plugin hands back: `Ok(None)` leaves the slot alone,
/// `Ok(Some(files))` replaces it at the end of the step.
pub type PluginResult = std::result::Result<Option<FileCollection>, BoxError>;

/// Name of a view within a data type.
///
/// Data types without declared views run a single pipeline under
/// [`ViewName::Default`], which the aggregated output renders flat.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum ViewName {
    /// The implicit view of a data type that declares none
    Default,
    /// A declared view
    Named(String),
}

impl ViewName {
    /// Shorthand for [`ViewName::Named`]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// The declared name, or `None` for the default view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name),
        }
    }

    /// Whether this is the implicit default view
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("(default)"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Everything a plugin may look at besides its own collection
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Data type whose pipeline is running
    pub data_type: String,

    /// View whose pipeline is running
    pub view: ViewName,

    /// Read-only snapshot of every slot, taken when the step was dispatched
    pub state: Arc<BuildState>,

    /// The whole resolved configuration, dirs included
    pub config: Arc<Config>,
}

impl PluginContext {
    /// Configuration of the data type whose pipeline is running
    pub fn data_type_config(&self) -> Option<&DataTypeConfig> {
        self.config.data_types.get(&self.data_type)
    }
}

/// A transformation stage
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Run against one slot's collection.
    ///
    /// `files` is an independent copy; mutating it in place is never
    /// observed by other plugins, only returning it is.
    async fn run(&self, files: FileCollection, ctx: &PluginContext) -> PluginResult;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name()).finish()
    }
}

/// Plugin backed by an async closure. Built with [`from_fn`].
pub struct FnPlugin<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> Plugin for FnPlugin<F>
where
    F: Fn(FileCollection, PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PluginResult> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, files: FileCollection, ctx: &PluginContext) -> PluginResult {
        (self.func)(files, ctx.clone()).await
    }
}

/// Wrap an async closure as a shareable plugin.
pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn Plugin>
where
    F: Fn(FileCollection, PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PluginResult> + Send + 'static,
{
    Arc::new(FnPlugin {
        name: name.into(),
        func,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileRecord;

    fn context() -> PluginContext {
        PluginContext {
            data_type: "blog".to_string(),
            view: ViewName::named("single"),
            state: Arc::new(BuildState::default()),
            config: Arc::new(Config::new().data_type("blog", DataTypeConfig::new("*.md"))),
        }
    }

    #[test]
    fn test_view_name_display() {
        assert_eq!(ViewName::named("single").to_string(), "single");
        assert_eq!(ViewName::Default.to_string(), "(default)");
        assert_eq!(ViewName::Default.as_str(), None);
        assert!(ViewName::Default.is_default());
    }

    #[test]
    fn test_default_view_sorts_first() {
        let mut views = vec![ViewName::named("b"), ViewName::Default, ViewName::named("a")];
        views.sort();
        assert_eq!(
            views,
            vec![ViewName::Default, ViewName::named("a"), ViewName::named("b")]
        );
    }

    #[test]
    fn test_context_finds_own_data_type() {
        let ctx = context();
        assert_eq!(ctx.data_type_config().unwrap().pattern, "*.md");

        let other = PluginContext {
            data_type: "images".to_string(),
            ..context()
        };
        assert!(other.data_type_config().is_none());
    }

    #[tokio::test]
    async fn test_from_fn_passes_files_and_context() {
        let plugin = from_fn("echo", |files, ctx| async move {
            assert_eq!(ctx.data_type, "blog");
            assert_eq!(ctx.view, ViewName::named("single"));
            Ok(Some(files))
        });
        let files = vec![FileRecord::new("a.txt", "a")];
        let out = plugin.run(files.clone(), &context()).await.unwrap();
        assert_eq!(out, Some(files));
        assert_eq!(plugin.name(), "echo");
    }

    #[tokio::test]
    async fn test_from_fn_propagates_error() {
        let plugin = from_fn("fail", |_files, _ctx| async move { Err("nope".into()) });
        let err = plugin.run(Vec::new(), &context()).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
