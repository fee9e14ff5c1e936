//! SQLite helper utilities for type conversion
//!
//! SQLite has no native UUID or timestamp types. Ids are random v4 UUIDs stored
//! as TEXT, and timestamps as RFC 3339 TEXT with sub-second precision so that
//! lexical ordering matches chronological ordering.

use anyhow::{Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

// ============================================================================
// UUID Helpers
// ============================================================================

/// Generate a new random id in its stored form
#[inline]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Current UTC time as a fixed-width RFC 3339 string (microseconds, `Z` suffix)
#[inline]
pub fn now_iso8601() -> String {
    datetime_to_str(Utc::now())
}

/// Convert a chrono DateTime to the stored timestamp format
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

// ============================================================================
// Error Helpers
// ============================================================================

/// True when a sqlx error is a UNIQUE/PRIMARY KEY constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_new_id_parses() {
        let id = new_id();
        assert_eq!(Uuid::parse_str(&id).unwrap().to_string(), id);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        assert!(datetime_to_str(earlier) < datetime_to_str(later));
        assert_eq!(datetime_to_str(earlier).len(), datetime_to_str(later).len());
    }

    #[test]
    fn test_datetime_roundtrip() {
        let dt = Utc::now();
        let parsed = str_to_datetime(&datetime_to_str(dt)).unwrap();
        assert_eq!(dt.timestamp_micros(), parsed.timestamp_micros());
    }

    #[test]
    fn test_sqlite_datetime_format() {
        let parsed = str_to_datetime("2024-01-15 10:30:45").unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }
}
