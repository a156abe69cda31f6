//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod check;
pub mod config;
pub mod notify;
pub mod record;
pub mod run;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tally_core::{DispatchMode, Governor, GovernorConfig};

use crate::credentials::PromptCredentialProvider;
use crate::output::OutputFormat;

/// Shared context for all commands
pub struct Context {
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Context {
    pub fn config(&self) -> Result<GovernorConfig> {
        GovernorConfig::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }

    /// Governor for one command invocation
    pub fn governor(&self) -> Result<Governor> {
        let mut config = self.config()?;
        // the process exits right after the command, so deliveries are awaited
        if config.dispatch != DispatchMode::Inline {
            log::debug!("[tally:cli] Using inline dispatch instead of {:?}", config.dispatch);
            config.dispatch = DispatchMode::Inline;
        }

        let governor =
            Governor::from_config(&config, Arc::new(PromptCredentialProvider::default()))?;
        Ok(governor)
    }
}
