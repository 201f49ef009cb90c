//! Pipefold Runtime
//!
//! This crate provides the long-running modes around a pipefold build.
//!
//! # Features
//!
//! - Change-triggered rebuilds via `notify`
//! - Static file serving of the output directory via `tiny_http`
//!
//! # Usage
//!
//! ```rust,ignore
//! use pipefold_runtime::{WatchOptions, serve, watch};
//!
//! let server = serve(&config.dirs.out_dir, 8080)?;
//! let mut session = watch(Arc::new(Pipeline::new(config)), WatchOptions::default())?;
//! while let Some(result) = session.next().await {
//!     let rebuild = result?;
//!     println!("{} changed", rebuild.event.path.display());
//! }
//! server.close();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod notifier;
pub mod serve;
pub mod watch;

pub use notifier::{ChangeEvent, ChangeKind, FsNotifier};
pub use serve::{DEFAULT_PORT, ServerHandle, serve};
pub use watch::{Rebuild, Rebuilder, WatchOptions, WatchSession, WatchState, watch};
