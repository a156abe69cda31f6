//! Governor and call guard
//!
//! [`Governor`] is the handle callers hold. It is cheap to clone; every
//! clone shares one [`QuotaEngine`] behind a `tokio::sync::Mutex`, so
//! `can_call`/`record_call` from concurrent tasks are serialized.
//!
//! [`Guard`] wraps an async operation. Before running it, the guard
//! reserves a slot under the lock, so two tasks can never both pass the
//! check for the last remaining call. When the operation returns `Ok` the
//! slot becomes a recorded call; on `Err`, cancellation or panic it is
//! released.
//!
//! Alert delivery happens outside the lock, either awaited before
//! `record_call` returns ([`DispatchMode::Inline`]) or spawned on the
//! runtime ([`DispatchMode::Background`]).

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::alert::AlertAction;
use crate::clock::{Clock, SystemClock};
use crate::config::{GovernorConfig, QuotaConfig};
use crate::engine::{QuotaEngine, Recorded, UsageStats};
use crate::error::{Error, Result};
use crate::ledger::{AlertMarkerStore, LedgerStore};
use crate::notify::{CredentialProvider, Notifier};

/// Error message used when a guard refuses a call and none was supplied
pub const DEFAULT_QUOTA_MESSAGE: &str = "API quota reached!";

/// How alert deliveries are run relative to the recording call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Await delivery before returning; bounded by the retry budget
    #[default]
    Inline,
    /// Spawn delivery on the tokio runtime and return immediately
    Background,
}

// ============================================================================
// Builder
// ============================================================================

pub struct GovernorBuilder {
    quota: QuotaConfig,
    ledger_path: PathBuf,
    marker_store: Option<AlertMarkerStore>,
    notifier: Option<Notifier>,
    clock: Option<Arc<dyn Clock>>,
    dispatch: DispatchMode,
}

impl GovernorBuilder {
    /// Marker location; defaults to a sibling of the ledger file
    pub fn marker_store(mut self, store: AlertMarkerStore) -> Self {
        self.marker_store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    /// Load persisted state and return the governor
    pub fn build(self) -> Governor {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let marker_store = self
            .marker_store
            .unwrap_or_else(|| AlertMarkerStore::beside(&self.ledger_path));

        let engine = QuotaEngine::open(
            self.quota,
            LedgerStore::new(self.ledger_path),
            marker_store,
            clock.now(),
        );

        Governor {
            engine: Arc::new(Mutex::new(engine)),
            notifier: self.notifier.map(Arc::new),
            clock,
            quota: self.quota,
            dispatch: self.dispatch,
        }
    }
}

// ============================================================================
// Governor
// ============================================================================

/// Quota-aware gate in front of one rate-limited API
#[derive(Clone)]
pub struct Governor {
    engine: Arc<Mutex<QuotaEngine>>,
    notifier: Option<Arc<Notifier>>,
    clock: Arc<dyn Clock>,
    quota: QuotaConfig,
    dispatch: DispatchMode,
}

impl Governor {
    pub fn builder(quota: QuotaConfig, ledger_path: impl Into<PathBuf>) -> GovernorBuilder {
        GovernorBuilder {
            quota,
            ledger_path: ledger_path.into(),
            marker_store: None,
            notifier: None,
            clock: None,
            dispatch: DispatchMode::default(),
        }
    }

    /// Governor wired from a config file: SMTP notifier when a recipient is
    /// set, ledger and marker at their resolved paths
    pub fn from_config(
        config: &GovernorConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let mut builder = Self::builder(config.quota()?, config.ledger_path()?)
            .marker_store(config.marker_store()?)
            .dispatch(config.dispatch);
        if let Some(notifier) = Notifier::from_config(config, credentials) {
            builder = builder.notifier(notifier);
        }
        Ok(builder.build())
    }

    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    pub fn notifier(&self) -> Option<&Notifier> {
        self.notifier.as_deref()
    }

    pub async fn can_call(&self) -> bool {
        let now = self.clock.now();
        self.engine.lock().await.can_call(now)
    }

    /// Record one call made outside a guard. Returns `false`, recording
    /// nothing, when the quota refuses it.
    pub async fn record_call(&self) -> bool {
        let now = self.clock.now();
        let recorded = self.engine.lock().await.record_call(now);

        match recorded {
            Some(recorded) => {
                self.dispatch_actions(recorded).await;
                true
            }
            None => false,
        }
    }

    pub async fn usage_ratio(&self) -> f64 {
        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        engine.roll_over(now);
        engine.usage_ratio(now)
    }

    pub async fn stats(&self) -> UsageStats {
        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        engine.roll_over(now);
        engine.stats(now)
    }

    /// "Calls left: N out of M this month (Month YYYY)"
    pub async fn summary(&self) -> String {
        self.stats().await.to_string()
    }

    /// Drop cached mail credentials
    pub fn clear_credentials(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.clear_credentials();
        }
    }

    /// Wrap `operation` so it only runs while quota remains
    pub fn guard<F, T>(&self, operation: F) -> Guard<F, T> {
        Guard {
            governor: self.clone(),
            operation,
            fallback: None,
            message: DEFAULT_QUOTA_MESSAGE.to_string(),
        }
    }

    async fn reserve(&self) -> Option<Reservation> {
        let now = self.clock.now();
        let mut engine = self.engine.lock().await;
        if !engine.reserve(now) {
            return None;
        }
        Some(Reservation {
            engine: Arc::clone(&self.engine),
            armed: true,
        })
    }

    /// Record or release a reservation once the operation finished
    async fn settle(&self, mut reservation: Reservation, succeeded: bool) {
        let now = self.clock.now();
        let recorded = {
            let mut engine = self.engine.lock().await;
            reservation.armed = false;
            if succeeded {
                Some(engine.commit(now))
            } else {
                engine.release();
                None
            }
        };

        if let Some(recorded) = recorded {
            self.dispatch_actions(recorded).await;
        }
    }

    async fn dispatch_actions(&self, recorded: Recorded) {
        let Recorded { stats, actions } = recorded;

        // every in-flight flag gets a guard before the first await, so a
        // caller dropping this future mid-send leaves nothing stuck
        let mut pending = Vec::new();
        for action in actions {
            if let AlertAction::ThresholdNotice { usage_ratio } = action {
                log::warn!(
                    "[governor:alert] API usage has reached {:.0}% of monthly quota ({})",
                    usage_ratio * 100.0,
                    stats.monthly_limit
                );
                continue;
            }
            pending.push(PendingDelivery {
                engine: Arc::clone(&self.engine),
                clock: Arc::clone(&self.clock),
                action,
                armed: true,
            });
        }

        for delivery in pending {
            let task = deliver(delivery, self.notifier.clone(), stats.clone());
            match self.dispatch {
                DispatchMode::Inline => task.await,
                DispatchMode::Background => {
                    tokio::spawn(task);
                }
            }
        }
    }
}

/// Send one alert or digest and report the outcome to the engine
async fn deliver(pending: PendingDelivery, notifier: Option<Arc<Notifier>>, stats: UsageStats) {
    let action = pending.action;
    let delivered = match notifier.as_deref() {
        None => {
            log::debug!("[governor:alert] No notifier configured, dropping {:?}", action);
            false
        }
        Some(notifier) => {
            let result = match action {
                AlertAction::SendAlert { .. } => notifier.send_alert(&stats).await,
                AlertAction::SendDigest { .. } => notifier.send_digest(&stats).await,
                AlertAction::ThresholdNotice { .. } => Ok(()),
            };
            match result {
                Ok(()) => true,
                Err(e) => {
                    log::error!("[governor:alert] Delivery failed, will retry later: {}", e);
                    false
                }
            }
        }
    };

    pending.settle(delivered).await;
}

/// A scheduled delivery whose outcome the engine is waiting for. Dropped
/// unsettled, it reports the delivery as failed so the next qualifying
/// call schedules it again.
struct PendingDelivery {
    engine: Arc<Mutex<QuotaEngine>>,
    clock: Arc<dyn Clock>,
    action: AlertAction,
    armed: bool,
}

impl PendingDelivery {
    async fn settle(mut self, delivered: bool) {
        let engine = Arc::clone(&self.engine);
        let mut engine = engine.lock().await;
        self.armed = false;
        engine.complete(self.action, delivered, self.clock.now());
    }
}

impl Drop for PendingDelivery {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::debug!("[governor:alert] Delivery abandoned: {:?}", self.action);

        let action = self.action;
        let now = self.clock.now();
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.complete(action, false, now);
            return;
        }

        let engine = Arc::clone(&self.engine);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    engine.lock().await.complete(action, false, now);
                });
            }
            Err(_) => log::warn!("[governor:alert] {:?} stays in flight: no runtime to clear it", action),
        }
    }
}

/// Releases a reserved slot unless it was settled
struct Reservation {
    engine: Arc<Mutex<QuotaEngine>>,
    armed: bool,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut engine) = self.engine.try_lock() {
            engine.release();
            return;
        }

        let engine = Arc::clone(&self.engine);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    engine.lock().await.release();
                });
            }
            Err(_) => log::warn!("[governor:guard] Reserved slot leaked: no runtime to release it"),
        }
    }
}

// ============================================================================
// Guard
// ============================================================================

/// Refusal or failure of a guarded call
#[derive(Debug, thiserror::Error)]
pub enum GuardError<E> {
    /// No quota left and no fallback supplied; the operation was not run
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The operation ran and failed; nothing was recorded
    #[error("{0}")]
    Operation(E),
}

impl<E> GuardError<E> {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, GuardError::QuotaExceeded(_))
    }
}

impl From<GuardError<Error>> for Error {
    fn from(err: GuardError<Error>) -> Self {
        match err {
            GuardError::QuotaExceeded(message) => Error::quota_exceeded(message),
            GuardError::Operation(e) => e,
        }
    }
}

/// A governed operation, created by [`Governor::guard`]
///
/// Every successful invocation is recorded against the quota. When the
/// quota is exhausted the operation is not run: the fallback is returned if
/// one was set, otherwise [`GuardError::QuotaExceeded`].
pub struct Guard<F, T> {
    governor: Governor,
    operation: F,
    fallback: Option<T>,
    message: String,
}

impl<F, T: Clone> Guard<F, T> {
    /// Value returned instead of running the operation when quota is gone
    pub fn fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Message carried by [`GuardError::QuotaExceeded`]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub async fn call<Fut, E>(&self) -> std::result::Result<T, GuardError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let Some(reservation) = self.governor.reserve().await else {
            return self.refuse();
        };
        let result = (self.operation)().await;
        self.governor.settle(reservation, result.is_ok()).await;
        result.map_err(GuardError::Operation)
    }

    pub async fn call_with<A, Fut, E>(&self, arg: A) -> std::result::Result<T, GuardError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let Some(reservation) = self.governor.reserve().await else {
            return self.refuse();
        };
        let result = (self.operation)(arg).await;
        self.governor.settle(reservation, result.is_ok()).await;
        result.map_err(GuardError::Operation)
    }

    fn refuse<E>(&self) -> std::result::Result<T, GuardError<E>> {
        match &self.fallback {
            Some(value) => {
                log::info!("[governor:guard] {} Returning fallback", self.message);
                Ok(value.clone())
            }
            None => {
                log::info!("[governor:guard] {}", self.message);
                Err(GuardError::QuotaExceeded(self.message.clone()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn governor(dir: &TempDir, monthly: u32, daily: u32) -> Governor {
        let start = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        Governor::builder(
            QuotaConfig::new(monthly, daily).unwrap(),
            dir.path().join("calls.json"),
        )
        .clock(Arc::new(ManualClock::new(start)))
        .build()
    }

    #[tokio::test]
    async fn test_record_call_until_exhausted() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 2, 10);

        assert!(gov.record_call().await);
        assert!(gov.record_call().await);
        assert!(!gov.can_call().await);
        assert!(!gov.record_call().await);
        assert_eq!(gov.stats().await.used_month, 2);
    }

    #[tokio::test]
    async fn test_summary() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 10, 10);
        gov.record_call().await;

        assert_eq!(
            gov.summary().await,
            "Calls left: 9 out of 10 this month (October 2026)"
        );
        assert!((gov.usage_ratio().await - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_guard_records_success() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 5, 5);
        let fetch = gov.guard(|| async { Ok::<_, String>("sunny") });

        assert_eq!(fetch.call().await.unwrap(), "sunny");
        assert_eq!(gov.stats().await.used_month, 1);
    }

    #[tokio::test]
    async fn test_guard_does_not_record_failure() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 5, 5);
        let fetch = gov.guard(|| async { Err::<u32, _>("503".to_string()) });

        let err = fetch.call().await.unwrap_err();
        assert!(matches!(err, GuardError::Operation(ref e) if e == "503"));
        assert_eq!(gov.stats().await.used_month, 0);
        assert!(gov.can_call().await);
    }

    #[tokio::test]
    async fn test_guard_fallback_skips_operation() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 1, 1);
        gov.record_call().await;

        let runs = AtomicU32::new(0);
        let fetch = gov
            .guard(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Some(21.5))
            })
            .fallback(None);

        assert_eq!(fetch.call().await.unwrap(), None);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_guard_without_fallback_reports_quota_exceeded() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 1, 1);
        gov.record_call().await;

        let fetch = gov
            .guard(|| async { Ok::<u32, String>(1) })
            .message("weather quota spent");

        match fetch.call().await {
            Err(GuardError::QuotaExceeded(message)) => assert_eq!(message, "weather quota spent"),
            other => panic!("expected quota error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_guard_call_with_argument() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 5, 5);
        let lookup = gov.guard(|city: &'static str| async move { Ok::<_, String>(city.len()) });

        assert_eq!(lookup.call_with("Lisbon").await.unwrap(), 6);
        assert_eq!(gov.stats().await.used_month, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_guards_respect_limit() {
        let dir = TempDir::new().unwrap();
        let gov = governor(&dir, 5, 5);
        let runs = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let gov = gov.clone();
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                let op = gov.guard(move || {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, String>(())
                    }
                });
                op.call().await.is_ok()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
        assert_eq!(runs.load(Ordering::SeqCst), 5);
        assert_eq!(gov.stats().await.used_month, 5);
    }

    #[test]
    fn test_guard_error_into_core_error() {
        let err: Error = GuardError::<Error>::QuotaExceeded("API quota reached!".into()).into();
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }
}
