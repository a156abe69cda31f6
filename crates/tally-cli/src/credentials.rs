//! SMTP credentials for the CLI
//!
//! Environment first (`TALLY_SMTP_USER` / `TALLY_SMTP_PASSWORD`). When
//! either is missing and stdin is a terminal, ask for it with a masked
//! prompt; otherwise fail fast so scripts and cron jobs never hang.

use std::io::IsTerminal;

use inquire::{Password, PasswordDisplayMode, Text};
use tally_core::notify::{SMTP_PASSWORD_ENV, SMTP_USER_ENV};
use tally_core::{CredentialProvider, Credentials, EnvCredentialProvider, Error, Result};
use tokio::runtime::RuntimeFlavor;

#[derive(Debug, Default)]
pub struct PromptCredentialProvider {
    env: EnvCredentialProvider,
}

impl PromptCredentialProvider {
    fn prompt(&self) -> Result<Credentials> {
        let identity = match std::env::var(SMTP_USER_ENV) {
            Ok(user) if !user.trim().is_empty() => user,
            _ => Text::new("SMTP user (sender address):")
                .prompt()
                .map_err(prompt_error)?,
        };

        let secret = match std::env::var(SMTP_PASSWORD_ENV) {
            Ok(secret) if !secret.is_empty() => secret,
            _ => Password::new(&format!("SMTP app password for {}:", identity))
                .with_display_mode(PasswordDisplayMode::Masked)
                .without_confirmation()
                .prompt()
                .map_err(prompt_error)?,
        };

        Credentials::new(identity, secret)
    }
}

fn prompt_error(e: inquire::InquireError) -> Error {
    Error::credentials_unavailable(format!("prompt failed: {}", e))
}

impl CredentialProvider for PromptCredentialProvider {
    fn source(&self) -> &'static str {
        "env+prompt"
    }

    fn acquire(&self) -> Result<Credentials> {
        match self.env.acquire() {
            Ok(credentials) => Ok(credentials),
            Err(e) if !std::io::stdin().is_terminal() => Err(e),
            Err(e) => {
                log::debug!("[tally:credentials] {}; prompting", e);
                off_runtime(|| self.prompt())
            }
        }
    }
}

/// Run a blocking prompt without stalling the other tasks on this worker
fn off_runtime<T>(prompt: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(prompt)
        }
        _ => prompt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_off_runtime_without_runtime() {
        assert_eq!(off_runtime(|| 7), 7);
    }

    #[tokio::test]
    async fn test_off_runtime_on_current_thread() {
        assert_eq!(off_runtime(|| "ok"), "ok");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_off_runtime_on_worker() {
        let handle = tokio::spawn(async { off_runtime(|| 1 + 1) });
        assert_eq!(handle.await.unwrap(), 2);
    }
}
