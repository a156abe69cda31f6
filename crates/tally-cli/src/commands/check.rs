//! Check command
//!
//! Scriptable gate: `tally check && call-the-api`.

use std::process::ExitCode;

use anyhow::Result;
use serde::Serialize;

use super::Context;
use crate::output::{print_info, print_json, print_warning, OutputFormat};

#[derive(Debug, Serialize)]
struct CheckResult {
    allowed: bool,
    summary: String,
}

pub async fn execute(ctx: &Context) -> Result<ExitCode> {
    let governor = ctx.governor()?;
    let allowed = governor.can_call().await;
    let summary = governor.summary().await;

    match ctx.format {
        OutputFormat::Json => print_json(&CheckResult { allowed, summary })?,
        OutputFormat::Table if allowed => print_info(&format!("Allowed. {}", summary), ctx.quiet),
        OutputFormat::Table => print_warning(&format!("Quota exhausted. {}", summary), ctx.quiet),
    }

    Ok(if allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
