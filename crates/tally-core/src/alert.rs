//! Alert policy
//!
//! Decides, on every recorded call, which notifications are due. Two
//! independent axes:
//!
//! ```text
//! digest:   Quiet --(ratio >= digest_threshold)--> DigestActive
//!           DigestActive sends at most one digest per calendar day
//!
//! monthly:  NotSent --(ratio >= alert_threshold, delivered)--> Sent
//! ```
//!
//! Both axes return to their initial state on month rollover. A delivery
//! that fails leaves its axis untouched, so the next qualifying call tries
//! again. While a delivery is in flight no duplicate is scheduled.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::QuotaConfig;
use crate::ledger::AlertMarker;
use crate::window::same_month;

/// Tolerance for ratio/threshold comparisons (ratios are count / limit)
const RATIO_EPSILON: f64 = 1e-9;

fn reached(ratio: f64, threshold: f64) -> bool {
    ratio + RATIO_EPSILON >= threshold
}

// ============================================================================
// Actions
// ============================================================================

/// Something the policy wants done after a call was recorded
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertAction {
    /// One-shot operator notice that usage crossed the digest threshold
    ThresholdNotice { usage_ratio: f64 },
    /// Deliver today's digest
    SendDigest { day: NaiveDate },
    /// Deliver the monthly high-usage alert
    SendAlert { day: NaiveDate },
}

impl AlertAction {
    /// Whether the action needs the notifier
    pub fn is_delivery(&self) -> bool {
        !matches!(self, AlertAction::ThresholdNotice { .. })
    }
}

// ============================================================================
// State
// ============================================================================

/// Mutable alert bookkeeping for one governed resource
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    monthly_alert_sent: bool,
    digest_mode_active: bool,
    digest_sent_on: Option<NaiveDate>,
    alert_sent_on: Option<NaiveDate>,
    digest_in_flight: bool,
    alert_in_flight: bool,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the persisted marker. The monthly alert counts as sent
    /// only if it was delivered in the month containing `now`.
    pub fn from_marker(marker: AlertMarker, now: NaiveDateTime) -> Self {
        let monthly_alert_sent = marker
            .alert_sent_on
            .map(|day| same_month(day.and_time(now.time()), now))
            .unwrap_or(false);

        Self {
            monthly_alert_sent,
            digest_sent_on: marker.date,
            alert_sent_on: marker.alert_sent_on,
            ..Self::default()
        }
    }

    /// Snapshot of the durable part
    pub fn marker(&self) -> AlertMarker {
        AlertMarker {
            date: self.digest_sent_on,
            alert_sent_on: self.alert_sent_on,
        }
    }

    pub fn monthly_alert_sent(&self) -> bool {
        self.monthly_alert_sent
    }

    pub fn digest_mode_active(&self) -> bool {
        self.digest_mode_active
    }

    pub fn digest_sent_on(&self) -> Option<NaiveDate> {
        self.digest_sent_on
    }

    /// Month rollover: both axes back to their initial state
    pub fn reset_month(&mut self) {
        self.monthly_alert_sent = false;
        self.digest_mode_active = false;
    }

    /// Apply the outcome of a delivery action
    ///
    /// Returns `true` when the durable marker changed and must be saved.
    pub fn complete(&mut self, action: AlertAction, delivered: bool, now: NaiveDateTime) -> bool {
        match action {
            AlertAction::ThresholdNotice { .. } => false,
            AlertAction::SendDigest { day } => {
                self.digest_in_flight = false;
                if delivered {
                    self.digest_sent_on = Some(day);
                }
                delivered
            }
            AlertAction::SendAlert { day } => {
                self.alert_in_flight = false;
                if delivered {
                    // a delivery that straddled a rollover belongs to the old month
                    if same_month(day.and_time(now.time()), now) {
                        self.monthly_alert_sent = true;
                    }
                    self.alert_sent_on = Some(day);
                }
                delivered
            }
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Threshold policy
#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    digest_threshold: f64,
    alert_threshold: f64,
}

impl AlertPolicy {
    pub fn new(quota: &QuotaConfig) -> Self {
        Self {
            digest_threshold: quota.digest_threshold(),
            alert_threshold: quota.alert_threshold(),
        }
    }

    /// Re-enter digest mode when a process starts mid-month already above
    /// the digest threshold. The threshold notice is not repeated.
    pub fn resume(&self, state: &mut AlertState, usage_ratio: f64) {
        if reached(usage_ratio, self.digest_threshold) {
            state.digest_mode_active = true;
        }
    }

    /// Evaluate after a call was recorded, updating `state` and returning the
    /// actions to carry out, in order.
    pub fn evaluate(
        &self,
        state: &mut AlertState,
        usage_ratio: f64,
        now: NaiveDateTime,
    ) -> Vec<AlertAction> {
        let today = now.date();
        let mut actions = Vec::new();

        if reached(usage_ratio, self.digest_threshold) && !state.digest_mode_active {
            state.digest_mode_active = true;
            actions.push(AlertAction::ThresholdNotice { usage_ratio });
        }

        if state.digest_mode_active
            && state.digest_sent_on != Some(today)
            && !state.digest_in_flight
        {
            state.digest_in_flight = true;
            actions.push(AlertAction::SendDigest { day: today });
        }

        if reached(usage_ratio, self.alert_threshold)
            && !state.monthly_alert_sent
            && !state.alert_in_flight
        {
            state.alert_in_flight = true;
            actions.push(AlertAction::SendAlert { day: today });
        }

        actions
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn policy() -> AlertPolicy {
        AlertPolicy::new(&QuotaConfig::new(10, 10).unwrap())
    }

    /// Evaluate and immediately report every delivery as `delivered`
    fn run(
        policy: &AlertPolicy,
        state: &mut AlertState,
        ratio: f64,
        now: NaiveDateTime,
        delivered: bool,
    ) -> Vec<AlertAction> {
        let actions = policy.evaluate(state, ratio, now);
        for action in &actions {
            state.complete(*action, delivered, now);
        }
        actions
    }

    #[test]
    fn test_quiet_below_digest_threshold() {
        let mut state = AlertState::new();
        let actions = run(&policy(), &mut state, 0.4, at(10, 18, 9), true);
        assert!(actions.is_empty());
        assert!(!state.digest_mode_active());
    }

    #[test]
    fn test_digest_threshold_emits_notice_and_digest() {
        let mut state = AlertState::new();
        let now = at(10, 18, 9);
        let actions = run(&policy(), &mut state, 0.5, now, true);

        assert_eq!(
            actions,
            vec![
                AlertAction::ThresholdNotice { usage_ratio: 0.5 },
                AlertAction::SendDigest { day: now.date() },
            ]
        );
        assert!(state.digest_mode_active());
        assert_eq!(state.digest_sent_on(), Some(now.date()));
    }

    #[test]
    fn test_resume_enters_digest_mode_silently() {
        let p = policy();
        let mut state = AlertState::new();
        p.resume(&mut state, 0.3);
        assert!(!state.digest_mode_active());

        p.resume(&mut state, 0.6);
        assert!(state.digest_mode_active());
        let now = at(10, 18, 9);
        let actions = run(&p, &mut state, 0.7, now, true);
        assert_eq!(actions, vec![AlertAction::SendDigest { day: now.date() }]);
    }

    #[test]
    fn test_notice_is_one_shot() {
        let p = policy();
        let mut state = AlertState::new();
        run(&p, &mut state, 0.5, at(10, 18, 9), true);
        let actions = run(&p, &mut state, 0.6, at(10, 18, 10), true);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_digest_once_per_day() {
        let p = policy();
        let mut state = AlertState::new();
        run(&p, &mut state, 0.5, at(10, 18, 9), true);
        assert!(run(&p, &mut state, 0.6, at(10, 18, 23), true).is_empty());

        let next_day = at(10, 19, 0);
        let actions = run(&p, &mut state, 0.6, next_day, true);
        assert_eq!(actions, vec![AlertAction::SendDigest { day: next_day.date() }]);
    }

    #[test]
    fn test_failed_digest_is_retried_same_day() {
        let p = policy();
        let mut state = AlertState::new();
        run(&p, &mut state, 0.5, at(10, 18, 9), false);
        assert_eq!(state.digest_sent_on(), None);

        let actions = run(&p, &mut state, 0.6, at(10, 18, 10), true);
        assert_eq!(actions, vec![AlertAction::SendDigest { day: at(10, 18, 0).date() }]);
    }

    #[test]
    fn test_monthly_alert_fires_once() {
        let p = policy();
        let mut state = AlertState::new();
        run(&p, &mut state, 0.5, at(10, 18, 9), true);

        let actions = run(&p, &mut state, 0.8, at(10, 18, 10), true);
        assert_eq!(actions, vec![AlertAction::SendAlert { day: at(10, 18, 0).date() }]);
        assert!(state.monthly_alert_sent());

        let actions = run(&p, &mut state, 0.9, at(10, 20, 10), true);
        assert_eq!(actions, vec![AlertAction::SendDigest { day: at(10, 20, 0).date() }]);
    }

    #[test]
    fn test_failed_monthly_alert_is_retried() {
        let p = policy();
        let mut state = AlertState::new();
        let first = run(&p, &mut state, 0.8, at(10, 18, 9), false);
        assert!(first.contains(&AlertAction::SendAlert { day: at(10, 18, 0).date() }));
        assert!(!state.monthly_alert_sent());

        let second = run(&p, &mut state, 0.9, at(10, 18, 10), true);
        assert!(second.contains(&AlertAction::SendAlert { day: at(10, 18, 0).date() }));
        assert!(state.monthly_alert_sent());
    }

    #[test]
    fn test_no_duplicate_while_in_flight() {
        let p = policy();
        let mut state = AlertState::new();
        let now = at(10, 18, 9);

        let first = p.evaluate(&mut state, 0.8, now);
        assert_eq!(first.iter().filter(|a| a.is_delivery()).count(), 2);

        // nothing completed yet
        let second = p.evaluate(&mut state, 0.9, now + Duration::minutes(1));
        assert!(second.is_empty());
    }

    #[test]
    fn test_reset_month() {
        let p = policy();
        let mut state = AlertState::new();
        run(&p, &mut state, 0.9, at(10, 30, 9), true);
        assert!(state.monthly_alert_sent());
        assert!(state.digest_mode_active());

        state.reset_month();
        assert!(!state.monthly_alert_sent());
        assert!(!state.digest_mode_active());
        assert!(run(&p, &mut state, 0.1, at(11, 1, 9), true).is_empty());
    }

    #[test]
    fn test_alert_completed_after_rollover_belongs_to_old_month() {
        let p = policy();
        let mut state = AlertState::new();
        let actions = p.evaluate(&mut state, 0.8, at(10, 31, 23));
        state.reset_month();

        for action in actions {
            state.complete(action, true, at(11, 1, 0));
        }
        assert!(!state.monthly_alert_sent());
        assert_eq!(state.marker().alert_sent_on, Some(at(10, 31, 0).date()));
    }

    #[test]
    fn test_from_marker() {
        let marker = AlertMarker {
            date: Some(at(10, 18, 0).date()),
            alert_sent_on: Some(at(10, 2, 0).date()),
        };

        let same_month = AlertState::from_marker(marker, at(10, 18, 12));
        assert!(same_month.monthly_alert_sent());
        assert_eq!(same_month.digest_sent_on(), Some(at(10, 18, 0).date()));
        assert!(!same_month.digest_mode_active());

        let next_month = AlertState::from_marker(marker, at(11, 1, 12));
        assert!(!next_month.monthly_alert_sent());
        assert_eq!(next_month.marker(), marker);
    }

    #[test]
    fn test_threshold_comparison_tolerates_float_noise() {
        assert!(reached(0.1 + 0.2, 0.3));
        assert!(reached(0.8, 0.8));
        assert!(!reached(0.79, 0.8));
    }
}
