// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Wall-clock time, for comparing against stored timestamps
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
#[derive(Clone, Debug)]
pub struct FakeClock {
    utc: Arc<Mutex<DateTime<Utc>>>,
}

impl FakeClock {
    /// Start at 2024-03-01T12:00:00Z
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default())
    }

    /// Start at a specific wall-clock time
    pub fn at(utc: DateTime<Utc>) -> Self {
        Self { utc: Arc::new(Mutex::new(utc)) }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        *self.utc.lock() += delta;
    }

    /// Jump to a specific wall-clock time
    pub fn set_utc(&self, utc: DateTime<Utc>) {
        *self.utc.lock() = utc;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.utc.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
