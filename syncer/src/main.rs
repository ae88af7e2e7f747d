//! Syncer - Main entry point
//!
//! Mirrors a source location into a destination and keeps it current.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use syncer::{config::Config, daemon, run, utils, LocationSpec, SyncError, SyncOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Run even when stdin is not a terminal
    #[arg(short = 'y', long, global = true)]
    assume_yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push SOURCE to DESTINATION, then keep pushing changes
    #[command(visible_alias = "p")]
    Sync(SyncArgs),
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Local directory or s3://bucket/prefix to read from
    #[arg(value_name = "SOURCE")]
    source: LocationSpec,

    /// Local directory or s3://bucket/prefix to write to
    #[arg(value_name = "DESTINATION")]
    destination: LocationSpec,

    /// Log puts and deletes without performing them
    #[arg(short, long)]
    noop: bool,

    /// Watch subdirectories of the source too
    #[arg(short, long)]
    recursive: bool,

    /// Delete destination objects that are missing from the source
    #[arg(short, long)]
    delete: bool,

    /// Exit after the initial reconciliation
    #[arg(long)]
    one_time: bool,
}

impl SyncArgs {
    fn options(&self, config: &Config) -> SyncOptions {
        SyncOptions {
            noop: self.noop,
            recursive: self.recursive,
            delete: self.delete,
            one_time: self.one_time,
            ..SyncOptions::from_config(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    if !cli.assume_yes && !std::io::stdin().is_terminal() {
        return Err(SyncError::NonInteractive.into());
    }

    tracing::info!("Starting syncer v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Sync(args) => {
            let options = args.options(&config);
            if options.noop {
                tracing::warn!("!!! Running in no-op mode.");
            }

            tokio::select! {
                result = run::run(&args.source, &args.destination, &config, &options) => {
                    result.with_context(|| {
                        format!("sync {} -> {} failed", args.source, args.destination)
                    })?;
                }
                signal = daemon::wait_for_signal() => {
                    tracing::info!("Received {}, shutting down", signal?);
                }
            }
        }
    }

    Ok(())
}
