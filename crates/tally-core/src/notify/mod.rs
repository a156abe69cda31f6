//! Operator notifications
//!
//! The [`Notifier`] formats usage alerts and digests and hands them to a
//! [`MailTransport`] under a [`RetryPolicy`]. Credentials are fetched once
//! through a [`CredentialCache`] and reused for every later send.
//!
//! Nothing here is fatal to the governed call path: callers log the error
//! and move on.

pub mod credentials;
pub mod retry;
pub mod transport;

use std::sync::Arc;

pub use credentials::{
    CredentialCache, CredentialProvider, Credentials, EnvCredentialProvider, NoCredentials,
    StaticCredentialProvider, SMTP_PASSWORD_ENV, SMTP_USER_ENV,
};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{MailTransport, OutgoingMail, SmtpMailTransport};

use crate::config::GovernorConfig;
use crate::engine::UsageStats;
use crate::error::Result;

const DISPLAY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Messages
// ============================================================================

/// Subject and body of the one-time monthly alert
pub fn alert_message(stats: &UsageStats) -> (String, String) {
    let subject = format!("API Usage Alert. {} Calls Left", stats.remaining_month);
    let body = format!(
        "API usage alert:\n\
         - Timestamp: {}\n\
         - {:.1}% of monthly quota used\n\
         - {} calls remaining out of {}\n\
         - Month: {}\n",
        stats.timestamp.format(DISPLAY_TIMESTAMP),
        stats.usage_ratio * 100.0,
        stats.remaining_month,
        stats.monthly_limit,
        stats.month_label(),
    );
    (subject, body)
}

/// Subject and body of the daily digest
pub fn digest_message(stats: &UsageStats) -> (String, String) {
    let subject = format!(
        "Daily API Usage. {} Calls Used, {} Left This Month",
        stats.used_today, stats.remaining_month
    );
    let body = format!(
        "Daily API usage report:\n\
         - Timestamp: {}\n\
         - Calls used today: {}\n\
         - Remaining today: {}\n\
         - Daily limit: {}\n\
         - This month: {} of {} calls left ({})\n",
        stats.timestamp.format(DISPLAY_TIMESTAMP),
        stats.used_today,
        stats.remaining_today,
        stats.daily_limit,
        stats.remaining_month,
        stats.monthly_limit,
        stats.month_label(),
    );
    (subject, body)
}

// ============================================================================
// Notifier
// ============================================================================

/// Sends alerts and digests to one recipient
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    credentials: CredentialCache,
    recipient: String,
    retry: RetryPolicy,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        provider: Arc<dyn CredentialProvider>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials: CredentialCache::new(provider),
            recipient: recipient.into(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// SMTP notifier for the configured recipient, or `None` when no
    /// recipient is configured
    pub fn from_config(
        config: &GovernorConfig,
        provider: Arc<dyn CredentialProvider>,
    ) -> Option<Self> {
        let recipient = config.alert_recipient.as_ref()?;
        let transport = SmtpMailTransport::new(
            config.smtp_host.clone(),
            config.smtp_port,
            config.send_timeout(),
        );
        let retry = config
            .retry_policy()
            .with_attempt_timeout(config.send_timeout());

        Some(Self::new(Arc::new(transport), provider, recipient.clone()).with_retry(retry))
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn send_alert(&self, stats: &UsageStats) -> Result<()> {
        let (subject, body) = alert_message(stats);
        self.deliver("monthly alert", subject, body).await
    }

    pub async fn send_digest(&self, stats: &UsageStats) -> Result<()> {
        let (subject, body) = digest_message(stats);
        self.deliver("daily digest", subject, body).await
    }

    /// Drop cached credentials
    pub fn clear_credentials(&self) {
        self.credentials.clear();
    }

    pub fn credentials_cached(&self) -> bool {
        self.credentials.is_cached()
    }

    async fn deliver(&self, label: &str, subject: String, body: String) -> Result<()> {
        // no point retrying without a secret
        let credentials = self.credentials.get().map_err(|e| {
            log::warn!("[governor:notify] Skipping {}: {}", label, e);
            e
        })?;

        let mail = OutgoingMail {
            from: credentials.identity().to_string(),
            to: self.recipient.clone(),
            subject,
            body,
        };

        self.retry
            .run(label, |_| self.transport.send(&credentials, &mail))
            .await?;

        log::info!(
            "[governor:notify] Sent {} to {} via {}",
            label,
            self.recipient,
            self.transport.transport_id()
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
