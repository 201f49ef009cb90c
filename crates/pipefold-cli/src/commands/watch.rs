//! Watch command

use anyhow::{Context, Result};
use pipefold_core::Pipeline;
use pipefold_runtime::{WatchOptions, WatchSession, watch};
use std::sync::Arc;

/// Run the watch command until a rebuild fails or Ctrl+C
pub async fn run(config_path: &str) -> Result<()> {
    let pipeline = Arc::new(Pipeline::new(super::load_config(config_path)?));

    // Initial build so the output exists before the first change
    pipeline.build().await.context("Initial build failed")?;

    let session = watch(Arc::clone(&pipeline), WatchOptions::default())?;
    drive(session).await
}

/// Log rebuilds until the session ends or Ctrl+C
pub async fn drive(mut session: WatchSession) -> Result<()> {
    loop {
        let result = tokio::select! {
            result = session.next() => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        };

        match result {
            Some(Ok(rebuild)) => {
                tracing::info!(
                    "✓ Rebuilt after {} was {} ({} file(s))",
                    rebuild.event.path.display(),
                    rebuild.event.kind,
                    rebuild.output.file_count()
                );
            }
            Some(Err(err)) => return Err(err).context("Rebuild failed"),
            None => return Ok(()),
        }
    }

    session.close().await
}
