//! Error types for pipefold-core

use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::{BoxError, ViewName};

/// Result type alias for pipefold-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipefold-core
#[derive(Error, Debug)]
pub enum Error {
    /// A data type's input pattern matched no files
    #[error("no files match the pattern {pattern}")]
    NoMatch {
        /// The pattern as it was globbed (after input-dir resolution)
        pattern: String,
    },

    /// A matched file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A plugin signaled failure
    #[error("plugin '{plugin}' failed in {data_type}/{view}: {source}")]
    Plugin {
        /// Data type whose pipeline was running
        data_type: String,
        /// View whose pipeline was running
        view: ViewName,
        /// Name reported by the plugin
        plugin: String,
        /// Error returned by the plugin
        #[source]
        source: BoxError,
    },

    /// A plugin task panicked or was aborted before signaling completion
    #[error("plugin '{plugin}' in {data_type}/{view} did not complete: {message}")]
    PluginPanicked {
        /// Data type whose pipeline was running
        data_type: String,
        /// View whose pipeline was running
        view: ViewName,
        /// Name reported by the plugin
        plugin: String,
        /// Panic or abort description
        message: String,
    },

    /// The build was cancelled before it finished
    #[error("build cancelled")]
    Cancelled,

    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// A stage list references a plugin name nobody registered
    #[error("unknown plugin '{name}'")]
    UnknownPlugin {
        /// The unresolved plugin name
        name: String,
    },

    /// A glob pattern could not be compiled
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] glob::PatternError),
}

impl Error {
    /// Whether this error was raised while resolving configuration, before any build.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParse(_)
                | Self::ConfigInvalid { .. }
                | Self::UnknownPlugin { .. }
                | Self::InvalidPattern(_)
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }
}
