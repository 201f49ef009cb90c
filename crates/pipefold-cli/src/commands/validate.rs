//! Validate configuration command

use anyhow::Result;
use pipefold_core::OutputSpec;

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = super::load_config(config_path)?;

    tracing::info!("✓ Input dir: {}", config.dirs.in_dir.display());
    tracing::info!("✓ Output dir: {}", config.dirs.out_dir.display());

    for (name, data_type) in &config.data_types {
        tracing::info!(
            "✓ Data type '{}': {} ({} pre-process step(s))",
            name,
            data_type.pattern,
            data_type.pre_process.len()
        );
        match &data_type.output {
            OutputSpec::Default(stages) => {
                tracing::info!("    (default): {} step(s)", stages.len());
            }
            OutputSpec::Views(views) => {
                for (view, stages) in views {
                    tracing::info!("    {}: {} step(s)", view, stages.len());
                }
            }
        }
    }

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
