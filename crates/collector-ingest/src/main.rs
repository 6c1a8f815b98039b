//! Collector Ingest - relay descriptor and Torperf collection

use anyhow::Result;
use clap::{Parser, Subcommand};
use collector_common::logging::{init_logging, LogConfig, LogLevel};
use collector_ingest::config::CollectorConfig;
use collector_ingest::pipeline::{self, Stage};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "collector-ingest")]
#[command(author, version, about = "Tor relay descriptor and Torperf collector")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "COLLECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage enabled in the configuration
    Run,

    /// Import relay descriptors from the archives directory
    Descriptors,

    /// Download and merge Torperf series
    Torperf,

    /// Delete old files from the cleanup directory
    Clean,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let console_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };

    let log_config = LogConfig::builder()
        .console_level(console_level)
        .log_file_prefix("collector-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        },
    };

    if let Err(e) = run(cli).await {
        error!("Collector run failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = CollectorConfig::load(cli.config.as_deref())?;

    let stages = match cli.command {
        Command::Run => pipeline::enabled_stages(&config),
        Command::Descriptors => vec![Stage::Descriptors],
        Command::Torperf => vec![Stage::Torperf],
        Command::Clean => vec![Stage::Clean],
    };

    info!(?stages, "Starting collector run");
    pipeline::run_stages(&config, &stages).await?;
    info!("Collector run complete");
    Ok(())
}
