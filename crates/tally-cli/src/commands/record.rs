//! Record command

use std::process::ExitCode;

use anyhow::Result;

use super::Context;
use crate::output::{print_error, print_json, print_success, OutputFormat};

pub async fn execute(ctx: &Context) -> Result<ExitCode> {
    let governor = ctx.governor()?;
    let recorded = governor.record_call().await;
    let stats = governor.stats().await;

    if ctx.format == OutputFormat::Json {
        print_json(&stats)?;
    } else if recorded {
        print_success(&format!("Recorded call. {}", stats), ctx.quiet);
    } else {
        print_error(&format!("Quota exhausted, call not recorded. {}", stats));
    }

    Ok(if recorded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
