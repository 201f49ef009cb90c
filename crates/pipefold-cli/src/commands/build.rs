//! One-shot build command

use anyhow::{Context, Result};
use pipefold_core::Pipeline;

/// Run the build command
pub async fn run(config_path: &str, json: bool) -> Result<()> {
    let config = super::load_config(config_path)?;
    let output = Pipeline::new(config).build().await.context("Build failed")?;

    for (name, data_type) in output.iter() {
        tracing::info!("✓ {}: {} file(s)", name, data_type.file_count());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
