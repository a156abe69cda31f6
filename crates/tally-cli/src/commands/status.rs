//! Status command
//!
//! Usage for the current calendar month and day.

use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;
use tally_core::UsageStats;

use super::Context;
use crate::output::{print_info, print_json, print_output, OutputFormat};

/// Usage row for table display
#[derive(Debug, Serialize, Tabled)]
pub struct UsageRow {
    #[tabled(rename = "Window")]
    pub window: String,
    #[tabled(rename = "Used")]
    pub used: u32,
    #[tabled(rename = "Limit")]
    pub limit: u32,
    #[tabled(rename = "Left")]
    pub left: u32,
}

pub fn usage_rows(stats: &UsageStats) -> Vec<UsageRow> {
    vec![
        UsageRow {
            window: stats.month_label(),
            used: stats.used_month,
            limit: stats.monthly_limit,
            left: stats.remaining_month,
        },
        UsageRow {
            window: stats.timestamp.format("%Y-%m-%d").to_string(),
            used: stats.used_today,
            limit: stats.daily_limit,
            left: stats.remaining_today,
        },
    ]
}

pub async fn execute(ctx: &Context) -> Result<ExitCode> {
    let governor = ctx.governor()?;
    let stats = governor.stats().await;

    match ctx.format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            print_output(&usage_rows(&stats), ctx.format)?;
            print_info(&stats.to_string(), ctx.quiet);
        }
    }

    Ok(ExitCode::SUCCESS)
}
