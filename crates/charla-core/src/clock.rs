// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Injectable wall-clock abstraction.
//!
//! Every timestamp the core persists flows through a [`Clock`] so that
//! TTL expiry, inactivity sweeps, and ledger retention are deterministic
//! under test. Production code uses [`SystemClock`].

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of "now" for the session core.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Canonical persisted timestamp form: RFC 3339 UTC with millisecond
/// precision (`2026-08-30T12:34:56.789Z`).
///
/// All rows use this one format so lexicographic comparison in SQL agrees
/// with chronological order.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a persisted timestamp back into UTC.
pub fn from_db_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn db_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let s = to_db_timestamp(ts);
        assert_eq!(s, "2026-08-30T12:00:00.000Z");
        assert_eq!(from_db_timestamp(&s).unwrap(), ts);
    }

    #[test]
    fn db_timestamps_sort_lexicographically() {
        let earlier = Utc.with_ymd_and_hms(2026, 8, 30, 11, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        assert!(to_db_timestamp(earlier) < to_db_timestamp(later));
    }
}
