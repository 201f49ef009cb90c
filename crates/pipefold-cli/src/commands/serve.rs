//! Serve command

use anyhow::{Context, Result};
use pipefold_core::Pipeline;
use pipefold_runtime::{WatchOptions, serve, watch};
use std::sync::Arc;

/// Run the serve command until Ctrl+C (or a failed rebuild when watching)
pub async fn run(config_path: &str, port: u16, watch_changes: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let server = serve(&config.dirs.out_dir, port)?;

    let result = if watch_changes {
        let pipeline = Arc::new(Pipeline::new(config));
        let session = watch(pipeline, WatchOptions::default())?;
        super::watch::drive(session).await
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        tracing::info!("Shutting down...");
        Ok(())
    };

    server.close();
    result
}
