//! `intake`: operator tool for the admissions document intake pipeline

mod commands;

use admissions_intake::config::IntakeConfig;
use admissions_intake::observability::{self, ObservabilityConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{CompressCommand, ConfigCommand, IngestCommand, PurgeCommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "intake")]
#[command(version)]
#[command(about = "Ingest, inspect and purge admissions documents", long_about = None)]
struct Cli {
    /// Configuration file; defaults to the standard search locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service name used to locate configuration files
    #[arg(long, global = true, default_value = "admissions")]
    service: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a document for an owner and record its metadata
    Ingest(IngestCommand),
    /// Delete a stored document
    Purge(PurgeCommand),
    /// Preview image compression without storing anything
    Compress(CompressCommand),
    /// Print the effective configuration as TOML
    Config(ConfigCommand),
}

fn log_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info,admissions_intake=debug",
        _ => "debug,admissions_intake=trace",
    }
}

fn load_config(cli: &Cli) -> Result<IntakeConfig> {
    cli.config.as_ref().map_or_else(
        || IntakeConfig::load_for_service(&cli.service),
        IntakeConfig::load_from,
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_with(
        &ObservabilityConfig::default().with_directives(log_directives(cli.verbose)),
    )?;

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Ingest(cmd) => cmd.execute(&config).await?,
        Commands::Purge(cmd) => cmd.execute(&config).await?,
        Commands::Compress(cmd) => cmd.execute(&config).await?,
        Commands::Config(cmd) => cmd.execute(&config)?,
    }

    Ok(())
}
