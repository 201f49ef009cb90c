//! Pipefold Core Library
//!
//! This crate provides the build engine for Pipefold:
//! - Configuration parsing and plugin resolution
//! - File reading and per-view expansion
//! - The lock-step pipeline scheduler
//! - Result aggregation
//! - Built-in plugins
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Reader    │────▶│  Expander   │────▶│  Scheduler  │────▶│  Aggregate  │
//! │   (glob)    │     │ (per view)  │     │ (wavefront) │     │   (tree)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use pipefold_core::{Config, Pipeline, PluginRegistry};
//!
//! let config = Config::load("./pipefold.yaml", &PluginRegistry::with_builtins())?;
//! let output = Pipeline::new(config).build().await?;
//! for (name, data_type) in output.iter() {
//!     println!("{name}: {} file(s)", data_type.file_count());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod config;
pub mod error;
pub mod expander;
pub mod file;
pub mod pipeline;
pub mod plugin;
pub mod plugins;
pub mod reader;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use aggregate::{BuildOutput, DataTypeOutput};
pub use config::{Config, DataTypeConfig, Dirs, OutputSpec, StageList, Step};
pub use error::{Error, Result};
pub use file::{Content, FileCollection, FileRecord};
pub use pipeline::Pipeline;
pub use plugin::{BoxError, Plugin, PluginContext, PluginResult, ViewName, from_fn};
pub use registry::PluginRegistry;
pub use scheduler::CancelFlag;
pub use state::{BuildState, SlotKey};
