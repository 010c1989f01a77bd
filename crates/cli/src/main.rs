//! Routecheck CLI - Main Entry Point
//!
//! Operator surface over the regression environment: bring the compose
//! project up or down, load datasets, restart engines and maintain
//! reference files.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{dataset, environment, reference};
use routecheck_common::HarnessConfig;

/// Routecheck - regression harness for a containerized routing platform
#[derive(Parser)]
#[command(name = "routecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "routecheck.toml", env = "ROUTECHECK_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the environment and wait until it accepts data
    Up(environment::UpArgs),

    /// Load datasets (all configured ones by default)
    Load {
        datasets: Vec<String>,
    },

    /// Restart the engine of each dataset
    Restart {
        datasets: Vec<String>,
    },

    /// Stop and remove the engine of each dataset
    Stop {
        datasets: Vec<String>,
    },

    /// Show the containers of the environment
    Status,

    /// Re-derive stored responses with the current filters
    Regen(reference::RegenArgs),

    /// Stop and remove the environment
    Clean,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new(log_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if let Commands::Version = cli.command {
        println!("Routecheck CLI v{}", routecheck_common::VERSION);
        return Ok(());
    }

    let config = HarnessConfig::load(&cli.config)?;

    let result = match cli.command {
        Commands::Up(args) => environment::up(args, &config).await,
        Commands::Load { datasets } => dataset::load(&config, &datasets).await,
        Commands::Restart { datasets } => dataset::restart(&config, &datasets).await,
        Commands::Stop { datasets } => dataset::stop(&config, &datasets).await,
        Commands::Status => environment::status(&config, cli.format).await,
        Commands::Regen(args) => reference::regen(args),
        Commands::Clean => environment::clean(&config).await,
        Commands::Version => Ok(()),
    };

    if let Err(e) = result {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
