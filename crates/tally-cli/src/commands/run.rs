//! Run command
//!
//! Guards an external command with the quota. The command runs only when a
//! call is allowed, and is recorded only when it exits successfully.
//!
//! Exit codes: the child's own code, or 2 when the quota refused the run.

use std::process::{ExitCode, ExitStatus};

use anyhow::{anyhow, Result};
use tally_core::GuardError;
use tokio::process::Command;

use super::Context;
use crate::output::print_error;

/// Exit code when the quota refuses the run
pub const QUOTA_EXHAUSTED_EXIT: u8 = 2;

#[derive(Debug)]
enum RunFailure {
    Spawn(std::io::Error),
    Exit(ExitStatus),
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::Spawn(e) => write!(f, "failed to start: {}", e),
            RunFailure::Exit(status) => write!(f, "exited with {}", status),
        }
    }
}

/// Map a child exit status onto our own exit code
fn exit_code_for(status: ExitStatus) -> u8 {
    status
        .code()
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

pub async fn execute(ctx: &Context, command: Vec<String>) -> Result<ExitCode> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;
    let program = program.as_str();

    let governor = ctx.governor()?;
    let guarded = governor
        .guard(move || async move {
            let status = Command::new(program)
                .args(args)
                .status()
                .await
                .map_err(RunFailure::Spawn)?;
            if status.success() {
                Ok(status)
            } else {
                Err(RunFailure::Exit(status))
            }
        })
        .message(format!("API quota reached! Not running {}.", program));

    match guarded.call().await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(GuardError::QuotaExceeded(message)) => {
            print_error(&format!("{} {}", message, governor.summary().await));
            Ok(ExitCode::from(QUOTA_EXHAUSTED_EXIT))
        }
        Err(GuardError::Operation(RunFailure::Exit(status))) => {
            log::info!("[tally:run] {} {}, not recorded", program, RunFailure::Exit(status));
            Ok(ExitCode::from(exit_code_for(status)))
        }
        Err(GuardError::Operation(failure)) => Err(anyhow!("{}: {}", program, failure)),
    }
}
