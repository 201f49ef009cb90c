//! Pipefold CLI
//!
//! Build, watch and serve static content pipelines.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Pipefold - staged static content pipelines
#[derive(Parser)]
#[command(name = "pipefold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file, or a directory containing pipefold.yaml
    #[arg(short, long, default_value = "pipefold.yaml", env = "PIPEFOLD_CONFIG", global = true)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new pipefold project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Validate configuration without building
    Validate,

    /// Run one build
    Build {
        /// Print the aggregated result tree as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Rebuild whenever an input file changes
    Watch,

    /// Serve the output directory over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = pipefold_runtime::DEFAULT_PORT)]
        port: u16,

        /// Also rebuild on changes
        #[arg(short, long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path } => {
            commands::init::run(&path).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Build { json } => {
            commands::build::run(&cli.config, json).await?;
        }
        Commands::Watch => {
            commands::watch::run(&cli.config).await?;
        }
        Commands::Serve { port, watch } => {
            commands::serve::run(&cli.config, port, watch).await?;
        }
    }

    Ok(())
}
