//! Calendar window evaluation
//!
//! Pure functions over ledger records. A window is the calendar month (or
//! day) containing `now`; there is no rolling arithmetic.

use chrono::{Datelike, NaiveDateTime};

use crate::ledger::CallRecord;

/// True when `a` and `b` fall in the same calendar month
pub fn same_month(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// True when `a` and `b` fall on the same calendar day
pub fn same_day(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.date() == b.date()
}

/// Records whose year and month match `now`
pub fn filter_by_month(records: &[CallRecord], now: NaiveDateTime) -> Vec<CallRecord> {
    records
        .iter()
        .copied()
        .filter(|r| same_month(r.at(), now))
        .collect()
}

/// Records whose calendar date matches `now`
pub fn filter_by_day(records: &[CallRecord], now: NaiveDateTime) -> Vec<CallRecord> {
    records
        .iter()
        .copied()
        .filter(|r| same_day(r.at(), now))
        .collect()
}

pub fn count_in_month(records: &[CallRecord], now: NaiveDateTime) -> usize {
    records.iter().filter(|r| same_month(r.at(), now)).count()
}

pub fn count_in_day(records: &[CallRecord], now: NaiveDateTime) -> usize {
    records.iter().filter(|r| same_day(r.at(), now)).count()
}

/// Month rollover: the last record's (year, month) differs from `now`'s
pub fn is_rollover(last_record: NaiveDateTime, now: NaiveDateTime) -> bool {
    !same_month(last_record, now)
}

/// Day rollover: the last record's calendar date differs from `now`'s
pub fn is_day_rollover(last_record: NaiveDateTime, now: NaiveDateTime) -> bool {
    !same_day(last_record, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn records(times: &[NaiveDateTime]) -> Vec<CallRecord> {
        times.iter().copied().map(CallRecord::new).collect()
    }

    #[test]
    fn test_filter_by_month() {
        let recs = records(&[
            at(2026, 9, 30, 23),
            at(2026, 10, 1, 0),
            at(2026, 10, 18, 12),
            at(2025, 10, 18, 12), // same month, different year
        ]);
        let now = at(2026, 10, 20, 9);

        let month = filter_by_month(&recs, now);
        assert_eq!(month.len(), 2);
        assert_eq!(month[0].at(), at(2026, 10, 1, 0));
        assert_eq!(count_in_month(&recs, now), 2);
    }

    #[test]
    fn test_filter_by_day() {
        let recs = records(&[
            at(2026, 10, 17, 23),
            at(2026, 10, 18, 0),
            at(2026, 10, 18, 22),
            at(2026, 9, 18, 12), // same day-of-month, different month
        ]);
        let now = at(2026, 10, 18, 23);

        assert_eq!(filter_by_day(&recs, now).len(), 2);
        assert_eq!(count_in_day(&recs, now), 2);
    }

    #[test]
    fn test_empty_ledger() {
        let now = at(2026, 10, 18, 12);
        assert!(filter_by_month(&[], now).is_empty());
        assert_eq!(count_in_day(&[], now), 0);
    }

    #[test]
    fn test_is_rollover() {
        assert!(!is_rollover(at(2026, 10, 1, 0), at(2026, 10, 31, 23)));
        assert!(is_rollover(at(2026, 9, 30, 23), at(2026, 10, 1, 0)));
        assert!(is_rollover(at(2025, 10, 18, 12), at(2026, 10, 18, 12)));
        // clock moved backwards across a month boundary
        assert!(is_rollover(at(2026, 11, 1, 0), at(2026, 10, 31, 23)));
    }

    #[test]
    fn test_is_day_rollover() {
        assert!(!is_day_rollover(at(2026, 10, 18, 0), at(2026, 10, 18, 23)));
        assert!(is_day_rollover(at(2026, 10, 17, 23), at(2026, 10, 18, 0)));
    }
}
