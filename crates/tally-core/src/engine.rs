//! Quota engine
//!
//! Owns the ledger and alert state for one governed resource. All methods
//! take `now` explicitly; the [`Governor`](crate::Governor) supplies it from
//! its clock and serializes access behind a single lock.
//!
//! Month rollover is lazy: the first `can_call`/`record_call` in a new month
//! clears the ledger and resets the alert flags. Once the ledger holds a
//! record from the new month, rollover is a no-op.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::alert::{AlertAction, AlertPolicy, AlertState};
use crate::config::QuotaConfig;
use crate::ledger::{AlertMarkerStore, CallRecord, Ledger, LedgerStore};
use crate::window::{count_in_day, count_in_month, is_rollover};

// ============================================================================
// Usage stats
// ============================================================================

/// Point-in-time usage figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub timestamp: NaiveDateTime,
    pub used_month: u32,
    pub monthly_limit: u32,
    pub remaining_month: u32,
    pub used_today: u32,
    pub daily_limit: u32,
    pub remaining_today: u32,
    pub usage_ratio: f64,
}

impl UsageStats {
    /// e.g. "October 2026"
    pub fn month_label(&self) -> String {
        self.timestamp.format("%B %Y").to_string()
    }
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Calls left: {} out of {} this month ({})",
            self.remaining_month,
            self.monthly_limit,
            self.month_label()
        )
    }
}

/// Outcome of a successful `record_call`
#[derive(Debug, Clone)]
pub struct Recorded {
    pub stats: UsageStats,
    pub actions: Vec<AlertAction>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct QuotaEngine {
    quota: QuotaConfig,
    policy: AlertPolicy,
    ledger: Ledger,
    store: LedgerStore,
    alerts: AlertState,
    marker_store: AlertMarkerStore,
    /// Slots held by guarded operations that are still running
    reserved: u32,
}

impl QuotaEngine {
    /// Load ledger and marker from disk. Unreadable files are logged and
    /// treated as empty; the limits still apply from here on.
    pub fn open(
        quota: QuotaConfig,
        store: LedgerStore,
        marker_store: AlertMarkerStore,
        now: NaiveDateTime,
    ) -> Self {
        let ledger = store.load().unwrap_or_else(|e| {
            log::warn!(
                "[governor:engine] Could not load ledger {}, starting empty: {}",
                store.path().display(),
                e
            );
            Ledger::new()
        });

        let marker = marker_store.load().unwrap_or_else(|e| {
            log::warn!(
                "[governor:engine] Could not load alert marker {}, starting clean: {}",
                marker_store.path().display(),
                e
            );
            Default::default()
        });

        log::debug!(
            "[governor:engine] Opened ledger {} with {} record(s)",
            store.path().display(),
            ledger.len()
        );

        let mut engine = Self {
            policy: AlertPolicy::new(&quota),
            quota,
            ledger,
            store,
            alerts: AlertState::from_marker(marker, now),
            marker_store,
            reserved: 0,
        };
        let ratio = engine.usage_ratio(now);
        engine.policy.resume(&mut engine.alerts, ratio);
        engine
    }

    pub fn quota(&self) -> &QuotaConfig {
        &self.quota
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn alert_state(&self) -> &AlertState {
        &self.alerts
    }

    pub fn ledger_path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Clear the ledger and reset alert flags if the last record belongs to
    /// an earlier month. Returns `true` when a reset happened.
    pub fn roll_over(&mut self, now: NaiveDateTime) -> bool {
        let Some(last) = self.ledger.last() else {
            return false;
        };
        if !is_rollover(last.at(), now) {
            return false;
        }

        log::info!(
            "[governor:engine] New month ({}), clearing {} record(s)",
            now.format("%B %Y"),
            self.ledger.len()
        );
        self.ledger.clear();
        self.alerts.reset_month();
        self.persist_ledger();
        true
    }

    /// Whether one more call fits under both the monthly and daily limits
    pub fn can_call(&mut self, now: NaiveDateTime) -> bool {
        self.roll_over(now);
        self.has_room(now)
    }

    /// Append a call at `now`. Returns `None` without touching anything
    /// when the quota refuses it.
    pub fn record_call(&mut self, now: NaiveDateTime) -> Option<Recorded> {
        if !self.can_call(now) {
            log::debug!("[governor:engine] Refused call at {}", now);
            return None;
        }
        Some(self.append(now))
    }

    /// Take a slot for a guarded operation that has not finished yet
    pub(crate) fn reserve(&mut self, now: NaiveDateTime) -> bool {
        if !self.can_call(now) {
            return false;
        }
        self.reserved += 1;
        true
    }

    pub(crate) fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Turn a reservation into a recorded call
    pub(crate) fn commit(&mut self, now: NaiveDateTime) -> Recorded {
        self.release();
        self.roll_over(now);
        self.append(now)
    }

    /// `used_this_month / monthly_limit`
    pub fn usage_ratio(&self, now: NaiveDateTime) -> f64 {
        self.month_count(now) as f64 / self.quota.monthly_limit() as f64
    }

    pub fn stats(&self, now: NaiveDateTime) -> UsageStats {
        let used_month = self.month_count(now);
        let used_today = count_in_day(self.ledger.records(), now) as u32;

        UsageStats {
            timestamp: now,
            used_month,
            monthly_limit: self.quota.monthly_limit(),
            remaining_month: self.quota.monthly_limit().saturating_sub(used_month),
            used_today,
            daily_limit: self.quota.daily_limit(),
            remaining_today: self.quota.daily_limit().saturating_sub(used_today),
            usage_ratio: self.usage_ratio(now),
        }
    }

    /// Apply a delivery outcome to the alert state, saving the marker if it
    /// changed
    pub fn complete(&mut self, action: AlertAction, delivered: bool, now: NaiveDateTime) {
        if !self.alerts.complete(action, delivered, now) {
            return;
        }
        if let Err(e) = self.marker_store.save(&self.alerts.marker()) {
            log::warn!(
                "[governor:engine] Could not save alert marker {}: {}",
                self.marker_store.path().display(),
                e
            );
        }
    }

    fn month_count(&self, now: NaiveDateTime) -> u32 {
        count_in_month(self.ledger.records(), now) as u32
    }

    fn has_room(&self, now: NaiveDateTime) -> bool {
        let month = self.month_count(now) + self.reserved;
        let day = count_in_day(self.ledger.records(), now) as u32 + self.reserved;
        month < self.quota.monthly_limit() && day < self.quota.daily_limit()
    }

    fn append(&mut self, now: NaiveDateTime) -> Recorded {
        self.ledger.push(CallRecord::new(now));
        self.persist_ledger();

        let stats = self.stats(now);
        let actions = self
            .policy
            .evaluate(&mut self.alerts, stats.usage_ratio, now);

        Recorded { stats, actions }
    }

    /// In-memory state stays authoritative when the write fails
    fn persist_ledger(&self) {
        if let Err(e) = self.store.save(&self.ledger) {
            log::warn!(
                "[governor:engine] Could not save ledger {}, durability lost: {}",
                self.store.path().display(),
                e
            );
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
