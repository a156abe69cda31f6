//! Notify commands

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Subcommand;

use super::Context;
use crate::output::{print_info, print_success};

#[derive(Subcommand)]
pub enum NotifyAction {
    /// Send a usage digest now to check credentials and relay settings
    Test,
}

pub async fn execute(ctx: &Context, action: NotifyAction) -> Result<ExitCode> {
    match action {
        NotifyAction::Test => send_test(ctx).await,
    }
}

async fn send_test(ctx: &Context) -> Result<ExitCode> {
    let governor = ctx.governor()?;
    let notifier = governor
        .notifier()
        .ok_or_else(|| anyhow!("No alert_recipient configured; nothing to send to"))?;

    let stats = governor.stats().await;
    print_info(
        &format!("Sending digest to {}...", notifier.recipient()),
        ctx.quiet,
    );
    notifier.send_digest(&stats).await?;

    // drop the secret before exiting
    governor.clear_credentials();
    print_success(&format!("Sent test digest to {}", notifier.recipient()), ctx.quiet);
    Ok(ExitCode::SUCCESS)
}
