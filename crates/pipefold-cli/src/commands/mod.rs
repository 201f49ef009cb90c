//! CLI command implementations

pub mod build;
pub mod init;
pub mod serve;
pub mod validate;
pub mod watch;

use anyhow::{Context, Result};
use pipefold_core::{Config, PluginRegistry};

/// Load and resolve the configuration with the built-in plugins
pub fn load_config(config_path: &str) -> Result<Config> {
    Config::load(config_path, &PluginRegistry::with_builtins())
        .with_context(|| format!("Failed to load configuration from {config_path}"))
}
