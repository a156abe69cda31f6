//! Config commands
//!
//! Commands for inspecting and creating the config file.

use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;
use tally_core::config::LEDGER_PATH_ENV;
use tally_core::notify::{SMTP_PASSWORD_ENV, SMTP_USER_ENV};
use tally_core::GovernorConfig;

use super::Context;
use crate::output::{print_info, print_output, print_success};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the resolved configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Config row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    #[tabled(rename = "Key")]
    pub key: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

impl ConfigRow {
    fn new(key: &str, value: impl ToString, source: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            source: source.to_string(),
        }
    }
}

pub async fn execute(ctx: &Context, action: ConfigAction) -> Result<ExitCode> {
    match action {
        ConfigAction::Show => show_config(ctx),
        ConfigAction::Init { force } => init_config(ctx, force),
    }
}

fn show_config(ctx: &Context) -> Result<ExitCode> {
    let config = ctx.config()?;
    let source = if ctx.config_path.exists() { "file" } else { "default" };
    let rows = config_rows(&config, source)?;

    print_output(&rows, ctx.format)?;
    print_info(&format!("Config file: {}", ctx.config_path.display()), ctx.quiet);
    Ok(ExitCode::SUCCESS)
}

fn init_config(ctx: &Context, force: bool) -> Result<ExitCode> {
    if ctx.config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            ctx.config_path.display()
        );
    }

    GovernorConfig::default().save(&ctx.config_path)?;
    print_success(
        &format!("Wrote default config to {}", ctx.config_path.display()),
        ctx.quiet,
    );
    Ok(ExitCode::SUCCESS)
}

pub fn config_rows(config: &GovernorConfig, source: &str) -> Result<Vec<ConfigRow>> {
    let ledger_source = if std::env::var(LEDGER_PATH_ENV).is_ok() {
        "env"
    } else if config.ledger_path.is_some() {
        source
    } else {
        "default"
    };
    let ledger_path = config.ledger_path()?;
    let marker = config.marker_store()?;

    let mut rows = vec![
        ConfigRow::new("monthly_limit", config.monthly_limit, source),
        ConfigRow::new("daily_limit", config.daily_limit, source),
        ConfigRow::new("alert_threshold", config.alert_threshold, source),
        ConfigRow::new("digest_threshold", config.digest_threshold, source),
        ConfigRow::new("ledger_path", ledger_path.display(), ledger_source),
        ConfigRow::new("marker_path", marker.path().display(), source),
        ConfigRow::new(
            "alert_recipient",
            config.alert_recipient.as_deref().unwrap_or("-"),
            source,
        ),
        ConfigRow::new("retry_count", config.retry_count, source),
        ConfigRow::new("retry_delay_secs", config.retry_delay_secs, source),
        ConfigRow::new("retry_backoff", format!("{:?}", config.retry_backoff).to_lowercase(), source),
        ConfigRow::new("send_timeout_secs", config.send_timeout_secs, source),
        ConfigRow::new("smtp_host", &config.smtp_host, source),
        ConfigRow::new("smtp_port", config.smtp_port, source),
        ConfigRow::new("dispatch", format!("{:?}", config.dispatch).to_lowercase(), source),
    ];

    rows.push(ConfigRow::new(
        SMTP_USER_ENV,
        std::env::var(SMTP_USER_ENV).unwrap_or_else(|_| "-".to_string()),
        "env",
    ));
    rows.push(ConfigRow::new(
        SMTP_PASSWORD_ENV,
        mask_secret(std::env::var(SMTP_PASSWORD_ENV).ok().as_deref()),
        "env",
    ));

    Ok(rows)
}

fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => "****".to_string(),
        _ => "-".to_string(),
    }
}
