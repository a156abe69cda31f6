//! Tally CLI - quota-aware API call governor
//!
//! Inspect and record usage of a rate-limited API, and guard external
//! commands so they only run while quota remains.

mod commands;
mod credentials;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about = "Quota-aware API call governor", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: table (default) or json
    #[arg(long, global = true, default_value = "table")]
    format: output::OutputFormat,

    /// Suppress progress messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log governor activity (info level)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Override config file path (or set TALLY_CONFIG env var)
    #[arg(long, env = "TALLY_CONFIG", global = true)]
    config: Option<String>,

    /// Override ledger path (or set TALLY_LEDGER_PATH env var)
    #[arg(long, env = "TALLY_LEDGER_PATH", global = true)]
    ledger: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show usage for the current month and day
    Status,

    /// Exit 0 if a call is allowed right now, 1 otherwise
    Check,

    /// Record one call against the quota
    Record,

    /// Run a command only if quota remains, recording it on success
    Run {
        /// Program and arguments, e.g. `tally run -- curl https://api.example.com`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },

    /// Notification tools
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "info" } else { "warn" };
    env_logger::init_from_env(env_logger::Env::default().default_filter_or(default_filter));
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Path overrides flow through the same env vars the core library reads
    if let Some(config_path) = &cli.config {
        std::env::set_var(tally_core::config::CONFIG_PATH_ENV, config_path);
    }
    if let Some(ledger_path) = &cli.ledger {
        std::env::set_var(tally_core::config::LEDGER_PATH_ENV, ledger_path);
    }

    let ctx = commands::Context {
        config_path: tally_core::get_config_path()?,
        format: cli.format,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Status => commands::status::execute(&ctx).await,
        Commands::Check => commands::check::execute(&ctx).await,
        Commands::Record => commands::record::execute(&ctx).await,
        Commands::Run { command } => commands::run::execute(&ctx, command).await,
        Commands::Config { action } => commands::config::execute(&ctx, action).await,
        Commands::Notify { action } => commands::notify::execute(&ctx, action).await,
    }
}
