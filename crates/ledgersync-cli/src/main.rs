//! LedgerSync CLI - Command-line interface for LedgerSync
//!
//! Provides commands for:
//! - Viewing queue, cache and connectivity status
//! - Recording mutations while the ERP backend is unreachable
//! - Running a sync pass on demand
//! - Inspecting and clearing the offline cache
//! - Viewing and editing configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    cache::CacheCommand, config::ConfigCommand, enqueue::EnqueueCommand, queue::QueueCommand,
    status::StatusCommand, sync::SyncCommand, CliContext,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "ledgersync", version, about = "Offline sync for the ERP backend")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show queue, storage and connectivity status
    Status(StatusCommand),
    /// Inspect or clear the offline queue
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Record a create, update or delete for later replay
    Enqueue(EnqueueCommand),
    /// Replay the queue against the backend once
    Sync(SyncCommand),
    /// Inspect or clear the offline cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Log level for the given verbosity; warnings only by default so command
/// output stays readable
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let ctx = CliContext::load(cli.config.as_deref())?;

    let result = match &cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Queue(cmd) => cmd.execute(&ctx, format).await,
        Commands::Enqueue(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Cache(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    };

    if let Err(e) = &result {
        get_formatter(format).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ledgersync", "queue", "list", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Queue(QueueCommand::List)));
    }

    #[test]
    fn test_enqueue_parses() {
        let cli = Cli::try_parse_from([
            "ledgersync",
            "enqueue",
            "sale",
            "/api/sales",
            "--update",
            "S-1",
            "--payload",
            "{\"total\": 12.5}",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Enqueue(_)));
    }

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(5), "trace");
    }
}
