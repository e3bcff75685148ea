// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::job::{JobId, NewJob};
use crate::snapshot::{Constellation, PositionEstimate, Snapshot};
use chrono::{DateTime, TimeZone, Utc};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::JobStatus;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Waiting),
            Just(JobStatus::Processing),
            Just(JobStatus::Complete),
            Just(JobStatus::Failed),
        ]
    }
}

// ── Factories ───────────────────────────────────────────────────────────

/// Fixed reference time used by builders: 2024-03-01T12:00:00Z.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default()
}

/// A 12 ms snapshot (6138 bytes of sign data) captured at `at`, GPS only.
pub fn snapshot_at(at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        captured_at: at,
        constellations: vec![Constellation::Gps],
        temperature: Some(20.0),
        data: vec![0xA5; 6138],
    }
}

/// A job with `count` snapshots one minute apart starting at `first`.
pub fn new_job(id: &str, first: DateTime<Utc>, count: usize) -> NewJob {
    let snapshots =
        (0..count).map(|i| snapshot_at(first + chrono::Duration::minutes(i as i64))).collect();
    NewJob::new(JobId::from(id), snapshots)
}

/// A plausible estimate near Oxford.
pub fn estimate(seed: usize) -> PositionEstimate {
    PositionEstimate {
        latitude: 51.75 + seed as f64 * 1e-4,
        longitude: -1.25,
        time_correction_s: 0.25,
        horizontal_error_m: 15.0,
    }
}
