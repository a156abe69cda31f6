//! Mail credentials
//!
//! Credentials are an (identity, secret) pair held only in process memory.
//! They are obtained lazily from a [`CredentialProvider`] the first time a
//! notification needs them, cached for the life of the process, and dropped
//! with [`CredentialCache::clear`].
//!
//! Providers must fail fast: a provider that cannot produce a secret without
//! a human at the keyboard returns [`Error::CredentialsUnavailable`] instead
//! of blocking.

use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

/// Default environment variable holding the mail identity
pub const SMTP_USER_ENV: &str = "TALLY_SMTP_USER";

/// Default environment variable holding the mail secret (app password)
pub const SMTP_PASSWORD_ENV: &str = "TALLY_SMTP_PASSWORD";

/// Identity and secret for the mail relay
#[derive(Debug)]
pub struct Credentials {
    identity: String,
    secret: SecretString,
}

impl Credentials {
    /// Both parts must be non-empty
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let identity = identity.into();
        let secret = secret.into();
        if identity.trim().is_empty() || secret.is_empty() {
            return Err(Error::credentials_unavailable(
                "identity and secret must not be empty",
            ));
        }
        Ok(Self {
            identity,
            secret: SecretString::from(secret),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

// ============================================================================
// Providers
// ============================================================================

/// Operator-supplied source of credentials
pub trait CredentialProvider: Send + Sync {
    /// Short name used in logs
    fn source(&self) -> &'static str;

    /// Produce credentials or fail immediately
    fn acquire(&self) -> Result<Credentials>;
}

/// Reads credentials from two environment variables
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    identity_var: String,
    secret_var: String,
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(SMTP_USER_ENV, SMTP_PASSWORD_ENV)
    }
}

impl EnvCredentialProvider {
    pub fn new(identity_var: impl Into<String>, secret_var: impl Into<String>) -> Self {
        Self {
            identity_var: identity_var.into(),
            secret_var: secret_var.into(),
        }
    }

    fn read(var: &str) -> Result<String> {
        std::env::var(var)
            .map_err(|_| Error::credentials_unavailable(format!("{} is not set", var)))
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn source(&self) -> &'static str {
        "env"
    }

    fn acquire(&self) -> Result<Credentials> {
        let identity = Self::read(&self.identity_var)?;
        let secret = Self::read(&self.secret_var)?;
        Credentials::new(identity, secret)
    }
}

/// Fixed credentials supplied by the embedding application
pub struct StaticCredentialProvider {
    identity: String,
    secret: SecretString,
}

impl StaticCredentialProvider {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::from(secret.into()),
        }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn source(&self) -> &'static str {
        "static"
    }

    fn acquire(&self) -> Result<Credentials> {
        Credentials::new(self.identity.clone(), self.secret.expose_secret().to_string())
    }
}

/// Provider for setups that never send mail
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn source(&self) -> &'static str {
        "none"
    }

    fn acquire(&self) -> Result<Credentials> {
        Err(Error::credentials_unavailable(
            "no credential provider configured",
        ))
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Process-lifetime credential cache in front of a provider
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    cached: Mutex<Option<Arc<Credentials>>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    /// Cached credentials, acquiring them on first use
    pub fn get(&self) -> Result<Arc<Credentials>> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(credentials) = cached.as_ref() {
            return Ok(Arc::clone(credentials));
        }

        log::debug!(
            "[governor:notify] Acquiring credentials from {} provider",
            self.provider.source()
        );
        let credentials = Arc::new(self.provider.acquire()?);
        *cached = Some(Arc::clone(&credentials));
        Ok(credentials)
    }

    pub fn is_cached(&self) -> bool {
        self.cached
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Drop cached credentials; the next `get` asks the provider again
    pub fn clear(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if cached.take().is_some() {
            log::debug!("[governor:notify] Cleared cached credentials");
        }
    }
}
