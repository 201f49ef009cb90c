//! Plugin registry
//!
//! Maps the names used in YAML stage lists to plugin factories. A factory
//! receives the reference's arguments (`Null` for a bare name) and builds the
//! plugin once, at configuration time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::PluginRef;
use crate::error::{Error, Result};
use crate::plugin::Plugin;

/// Builds a plugin from its YAML arguments
pub type PluginFactory = Arc<dyn Fn(&serde_yaml::Value) -> Result<Arc<dyn Plugin>> + Send + Sync>;

/// Named plugin factories
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in plugins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::plugins::register_builtins(&mut registry);
        registry
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&serde_yaml::Value) -> Result<Arc<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register a ready-made plugin under its own name; arguments are ignored
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        let name = plugin.name().to_string();
        self.register(name, move |_args| Ok(Arc::clone(&plugin)))
    }

    /// Whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the plugin a stage list entry refers to
    pub fn create(&self, reference: &PluginRef) -> Result<Arc<dyn Plugin>> {
        let (name, args) = reference.parts()?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin {
                name: name.to_string(),
            })?;
        factory(&args)
    }
}

/// Deserialize plugin arguments, treating a bare name as an empty mapping.
pub fn parse_args<T: DeserializeOwned>(plugin: &str, args: &serde_yaml::Value) -> Result<T> {
    let args = match args {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
        other => other.clone(),
    };
    serde_yaml::from_value(args).map_err(|err| Error::ConfigInvalid {
        message: format!("plugin '{plugin}': {err}"),
    })
}
