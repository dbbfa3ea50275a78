// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A clock advanced by hand.

use std::sync::Mutex;
use std::time::Duration;

use charla_core::Clock;
use chrono::{DateTime, TimeZone, Utc};

/// Deterministic [`Clock`] for tests. Starts at a fixed instant and only
/// moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts at 2026-08-30T12:00:00Z.
    pub fn new() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(d).expect("advance out of range");
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::minutes(minutes);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_the_reading() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - before, chrono::Duration::seconds(90));
    }
}
