//! Call ledger
//!
//! The ledger is the insertion-ordered list of timestamps of successful
//! governed calls. Calls are always appended as "now", so the order is also
//! chronological. On disk it is a JSON array of ISO-8601 strings:
//!
//! ```json
//! ["2026-10-01T08:15:02.481223", "2026-10-01T09:40:11"]
//! ```

pub mod store;

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

pub use store::{AlertMarker, AlertMarkerStore, LedgerStore};

/// Format used when writing timestamps (fraction printed only when non-zero)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ============================================================================
// CallRecord
// ============================================================================

/// One successful governed call. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallRecord(NaiveDateTime);

impl CallRecord {
    pub fn new(at: NaiveDateTime) -> Self {
        Self(at)
    }

    pub fn at(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl Serialize for CallRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CallRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CallRecordVisitor;

        impl Visitor<'_> for CallRecordVisitor {
            type Value = CallRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an ISO-8601 datetime string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<CallRecord, E> {
                parse_timestamp(v)
                    .map(CallRecord)
                    .ok_or_else(|| E::custom(format!("invalid call timestamp: {v}")))
            }
        }

        deserializer.deserialize_str(CallRecordVisitor)
    }
}

/// Parse a stored timestamp
///
/// Accepts ISO-8601 without offset (what the ledger writes), RFC 3339 with
/// an offset (converted to local wall-clock time), and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT) {
        return Some(naive);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Local).naive_local());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive);
    }

    log::warn!("[governor:ledger] Failed to parse timestamp: {}", s);
    None
}

// ============================================================================
// Ledger
// ============================================================================

/// Ordered sequence of call records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    records: Vec<CallRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CallRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record
    pub fn last(&self) -> Option<&CallRecord> {
        self.records.last()
    }

    pub(crate) fn push(&mut self, record: CallRecord) {
        self.records.push(record);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Timelike};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_parse_timestamp_iso_with_fraction() {
        let dt = parse_timestamp("2026-02-04T10:30:00.123456").unwrap();
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 2);
        assert_eq!(dt.day(), 4);
        assert_eq!(dt.nanosecond(), 123_456_000);
    }

    #[test]
    fn test_parse_timestamp_iso_without_fraction() {
        let dt = parse_timestamp("2026-02-04T10:30:00").unwrap();
        assert_eq!(dt, at(2026, 2, 4, 10, 30, 0));
    }

    #[test]
    fn test_parse_timestamp_space_separated() {
        let dt = parse_timestamp("2026-02-04 10:30:00").unwrap();
        assert_eq!(dt, at(2026, 2, 4, 10, 30, 0));
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        assert!(parse_timestamp("2026-02-04T10:30:00Z").is_some());
        assert!(parse_timestamp("2026-02-04T10:30:00+02:00").is_some());
    }

    #[test]
    fn test_parse_timestamp_invalid() {
        assert!(parse_timestamp("invalid").is_none());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2026-13-40T00:00:00").is_none());
    }

    #[test]
    fn test_call_record_serializes_as_iso_string() {
        let record = CallRecord::new(at(2026, 10, 1, 8, 15, 2));
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, "\"2026-10-01T08:15:02\"");
    }

    #[test]
    fn test_ledger_is_a_plain_json_array() {
        let ledger = Ledger::from_records(vec![
            CallRecord::new(at(2026, 10, 1, 8, 0, 0)),
            CallRecord::new(at(2026, 10, 1, 9, 0, 0)),
        ]);
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(json, r#"["2026-10-01T08:00:00","2026-10-01T09:00:00"]"#);
    }

    #[test]
    fn test_ledger_rejects_garbage_entries() {
        let result = serde_json::from_str::<Ledger>(r#"["2026-10-01T08:00:00", "yesterday"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_push_and_last() {
        let mut ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert!(ledger.last().is_none());

        ledger.push(CallRecord::new(at(2026, 10, 1, 8, 0, 0)));
        ledger.push(CallRecord::new(at(2026, 10, 2, 8, 0, 0)));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last().unwrap().at(), at(2026, 10, 2, 8, 0, 0));

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
