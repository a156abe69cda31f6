//! Governor configuration
//!
//! Two layers:
//! - [`QuotaConfig`]: the validated limits and thresholds. Fixed for the
//!   lifetime of a governor; invalid values are a construction-time error.
//! - [`GovernorConfig`]: the JSON file surface. Every key is optional and
//!   falls back to a default, so a missing file means "all defaults".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::governor::DispatchMode;
use crate::ledger::AlertMarkerStore;
use crate::notify::{Backoff, RetryPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound accepted for `monthly_limit`
pub const MAX_MONTHLY_LIMIT: u32 = 5000;

/// Upper bound accepted for `daily_limit`
pub const MAX_DAILY_LIMIT: u32 = 1000;

/// Usage ratio at which the one-time monthly alert fires
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.8;

/// Usage ratio at which daily digests start
pub const DEFAULT_DIGEST_THRESHOLD: f64 = 0.5;

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// Implicit-TLS submission relay
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Environment override for the config file location
pub const CONFIG_PATH_ENV: &str = "TALLY_CONFIG";

/// Environment override for the ledger file location
pub const LEDGER_PATH_ENV: &str = "TALLY_LEDGER_PATH";

const DEFAULT_LEDGER_FILE: &str = "api_calls.json";
const CONFIG_FILE: &str = "tally.json";

// ============================================================================
// QuotaConfig
// ============================================================================

/// Validated limits and thresholds for one governed resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaConfig {
    monthly_limit: u32,
    daily_limit: u32,
    alert_threshold: f64,
    digest_threshold: f64,
}

impl QuotaConfig {
    /// Limits with the default thresholds (alert 0.8, digest 0.5)
    pub fn new(monthly_limit: u32, daily_limit: u32) -> Result<Self> {
        Self::with_thresholds(
            monthly_limit,
            daily_limit,
            DEFAULT_ALERT_THRESHOLD,
            DEFAULT_DIGEST_THRESHOLD,
        )
    }

    pub fn with_thresholds(
        monthly_limit: u32,
        daily_limit: u32,
        alert_threshold: f64,
        digest_threshold: f64,
    ) -> Result<Self> {
        if monthly_limit == 0 || monthly_limit > MAX_MONTHLY_LIMIT {
            return Err(Error::config(format!(
                "monthly_limit must be between 1 and {}, got {}",
                MAX_MONTHLY_LIMIT, monthly_limit
            )));
        }
        if daily_limit == 0 || daily_limit > MAX_DAILY_LIMIT {
            return Err(Error::config(format!(
                "daily_limit must be between 1 and {}, got {}",
                MAX_DAILY_LIMIT, daily_limit
            )));
        }
        check_fraction("alert_threshold", alert_threshold)?;
        check_fraction("digest_threshold", digest_threshold)?;
        if digest_threshold > alert_threshold {
            return Err(Error::config(format!(
                "digest_threshold ({}) must not exceed alert_threshold ({})",
                digest_threshold, alert_threshold
            )));
        }

        Ok(Self {
            monthly_limit,
            daily_limit,
            alert_threshold,
            digest_threshold,
        })
    }

    pub const fn monthly_limit(&self) -> u32 {
        self.monthly_limit
    }

    pub const fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub const fn alert_threshold(&self) -> f64 {
        self.alert_threshold
    }

    pub const fn digest_threshold(&self) -> f64 {
        self.digest_threshold
    }
}

/// Thresholds are fractions in (0, 1]
fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} must be a fraction in (0, 1], got {}",
            name, value
        )))
    }
}

// ============================================================================
// GovernorConfig
// ============================================================================

/// File-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub monthly_limit: u32,
    pub daily_limit: u32,
    pub alert_threshold: f64,
    pub digest_threshold: f64,
    /// Ledger file; `~` is expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,
    /// Dedup marker file; defaults to a sibling of the ledger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_path: Option<PathBuf>,
    /// Where alerts and digests are mailed. No recipient, no mail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_recipient: Option<String>,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub retry_backoff: Backoff,
    /// Bound on a single connect + auth + send attempt
    pub send_timeout_secs: u64,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub dispatch: DispatchMode,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            monthly_limit: MAX_MONTHLY_LIMIT,
            daily_limit: MAX_DAILY_LIMIT,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            digest_threshold: DEFAULT_DIGEST_THRESHOLD,
            ledger_path: None,
            marker_path: None,
            alert_recipient: None,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            retry_backoff: Backoff::Fixed,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            smtp_host: DEFAULT_SMTP_HOST.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            dispatch: DispatchMode::Inline,
        }
    }
}

impl GovernorConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "[governor:config] No config at {}, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;

        log::info!("[governor:config] Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check every field, including the quota limits
    pub fn validate(&self) -> Result<()> {
        self.quota()?;
        if self.retry_count == 0 {
            return Err(Error::config("retry_count must be at least 1"));
        }
        if self.send_timeout_secs == 0 {
            return Err(Error::config("send_timeout_secs must be at least 1"));
        }
        if self.smtp_host.trim().is_empty() {
            return Err(Error::config("smtp_host must not be empty"));
        }
        if let Some(recipient) = &self.alert_recipient {
            if !recipient.contains('@') {
                return Err(Error::config(format!(
                    "alert_recipient is not an email address: {}",
                    recipient
                )));
            }
        }
        Ok(())
    }

    pub fn quota(&self) -> Result<QuotaConfig> {
        QuotaConfig::with_thresholds(
            self.monthly_limit,
            self.daily_limit,
            self.alert_threshold,
            self.digest_threshold,
        )
    }

    /// Resolved ledger path: `TALLY_LEDGER_PATH`, then the file, then the
    /// platform data directory
    pub fn ledger_path(&self) -> Result<PathBuf> {
        if let Ok(path) = std::env::var(LEDGER_PATH_ENV) {
            return Ok(expand(Path::new(&path)));
        }
        if let Some(path) = &self.ledger_path {
            return Ok(expand(path));
        }

        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join(DEFAULT_LEDGER_FILE))
    }

    pub fn marker_store(&self) -> Result<AlertMarkerStore> {
        match &self.marker_path {
            Some(path) => Ok(AlertMarkerStore::new(expand(path))),
            None => Ok(AlertMarkerStore::beside(&self.ledger_path()?)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_count,
            Duration::from_secs(self.retry_delay_secs),
            self.retry_backoff,
        )
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Config file location: `TALLY_CONFIG`, else the platform config directory
pub fn get_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(expand(Path::new(&path)));
    }

    let dirs = project_dirs()?;
    Ok(dirs.config_dir().join(CONFIG_FILE))
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "tally", "Tally")
        .ok_or_else(|| Error::config("Could not determine project directories"))
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

// ============================================================================
// Tests
// ============================================================================
