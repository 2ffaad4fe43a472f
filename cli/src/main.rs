use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod output;

use crate::commands::{lease, simulate};

#[derive(Parser)]
#[command(name = "xtabctl")]
#[command(about = "Simulate and inspect HamTab cross-tab coordination")]
#[command(version)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human, json)
    #[arg(short, long, global = true, default_value = "human")]
    format: output::OutputFormat,

    /// Protocol configuration file (TOML)
    #[arg(short, long, global = true, env = "XTABCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run tabs against the in-memory simulator and print the timeline
    Simulate(simulate::SimulateArgs),
    /// Decode a stored lease record and check whether it is still valid
    Lease(lease::LeaseArgs),
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --format json output stays parseable.
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::load(cli.config.as_deref())?;
    config.debug |= cli.debug;
    debug!("Effective config: {:?}", config);

    match cli.command {
        Commands::Simulate(args) => simulate::execute(args, config, cli.format)?,
        Commands::Lease(args) => lease::execute(args, cli.format)?,
        Commands::Config => commands::config::execute(&config, cli.format)?,
    }

    Ok(())
}
