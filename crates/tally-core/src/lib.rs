//! # tally-core
//!
//! Quota governor for rate-limited external APIs - shared between the CLI
//! and embedding applications.
//!
//! This crate provides:
//! - Call ledger and its JSON persistence (`ledger` module)
//! - Calendar window evaluation (`window` module)
//! - Monthly/daily quota enforcement (`engine` module)
//! - Alert and digest policy (`alert` module)
//! - Email notifications with retries (`notify` module)
//! - The governor handle and call guard (`governor` module)
//! - Unified error handling (`error` module)

pub mod alert;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod governor;
pub mod ledger;
pub mod notify;
pub mod window;

// Re-exports for convenience
pub use error::{Error, Result};
pub use governor::{DispatchMode, Governor, GovernorBuilder, Guard, GuardError};

pub use alert::{AlertAction, AlertPolicy, AlertState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{get_config_path, GovernorConfig, QuotaConfig};
pub use engine::{QuotaEngine, UsageStats};
pub use ledger::{AlertMarker, AlertMarkerStore, CallRecord, Ledger, LedgerStore};
pub use notify::{
    Backoff, CredentialProvider, Credentials, EnvCredentialProvider, MailTransport, Notifier,
    OutgoingMail, RetryPolicy, SmtpMailTransport, StaticCredentialProvider,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version
pub fn version() -> &'static str {
    VERSION
}
