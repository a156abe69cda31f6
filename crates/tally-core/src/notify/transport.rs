//! Mail transport
//!
//! [`MailTransport`] is the seam between the notifier and the wire. The
//! production implementation submits over implicit TLS (SMTPS) to a fixed
//! relay; tests plug in an in-memory recorder.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::credentials::Credentials;
use crate::config::{DEFAULT_SEND_TIMEOUT_SECS, DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use crate::error::{Error, Result};

/// A plain-text message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers one message per call. Implementations do not retry.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Short name used in logs
    fn transport_id(&self) -> &'static str;

    async fn send(&self, credentials: &Credentials, mail: &OutgoingMail) -> Result<()>;
}

/// SMTPS submission to a relay host
#[derive(Debug, Clone)]
pub struct SmtpMailTransport {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for SmtpMailTransport {
    fn default() -> Self {
        Self::new(
            DEFAULT_SMTP_HOST,
            DEFAULT_SMTP_PORT,
            Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
        )
    }
}

impl SmtpMailTransport {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn build_message(mail: &OutgoingMail) -> Result<Message> {
        let from: Mailbox = mail
            .from
            .parse()
            .map_err(|e| Error::validation(format!("Invalid sender {}: {}", mail.from, e)))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| Error::validation(format!("Invalid recipient {}: {}", mail.to, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| Error::validation(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    fn transport_id(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, credentials: &Credentials, mail: &OutgoingMail) -> Result<()> {
        let message = Self::build_message(mail)?;

        let auth = SmtpCredentials::new(
            credentials.identity().to_string(),
            credentials.secret().expose_secret().to_string(),
        );

        // `relay` wraps the connection in TLS from the first byte
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
            .map_err(|e| Error::transport(format!("Relay {} unusable: {}", self.host, e)))?
            .port(self.port)
            .credentials(auth)
            .timeout(Some(self.timeout))
            .build();

        mailer.send(message).await.map_err(|e| {
            Error::transport(format!("SMTP {}:{}: {}", self.host, self.port, e))
        })?;

        log::debug!(
            "[governor:notify] Submitted \"{}\" to {} via {}:{}",
            mail.subject,
            mail.to,
            self.host,
            self.port
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutgoingMail {
        OutgoingMail {
            from: "ops@example.com".to_string(),
            to: to.to_string(),
            subject: "API Usage Alert. 2 Calls Left".to_string(),
            body: "hello".to_string(),
        }
    }

    #[test]
    fn test_default_relay() {
        let transport = SmtpMailTransport::default();
        assert_eq!(transport.host(), DEFAULT_SMTP_HOST);
        assert_eq!(transport.port(), 465);
        assert_eq!(transport.transport_id(), "smtp");
    }

    #[test]
    fn test_build_message() {
        assert!(SmtpMailTransport::build_message(&mail("alerts@example.com")).is_ok());
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let err = SmtpMailTransport::build_message(&mail("not an address")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.is_transient());
    }
}
