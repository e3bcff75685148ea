// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal decisions for a claimed job.

use crate::config::{ResultPolicy, WorkerConfig};
use chrono::{DateTime, Utc};
use sq_core::{FailureReason, Job, Resolution, SnapshotOutcome};
use std::collections::BTreeMap;

/// Decide the terminal state of a job whose every snapshot has an outcome.
///
/// The first fatal error (in snapshot order) fails the job under either
/// policy. Otherwise `Lenient` completes as long as one snapshot produced an
/// estimate, and `Strict` completes only if all of them did.
pub fn resolve(results: &BTreeMap<usize, SnapshotOutcome>, policy: ResultPolicy) -> Resolution {
    let failures = || results.iter().filter_map(|(i, o)| o.error().map(|e| (*i, e)));

    if let Some((snapshot, error)) = failures().find(|(_, e)| e.is_fatal()) {
        return Resolution::Failed(FailureReason::Positioning { snapshot, kind: error.kind });
    }
    if policy == ResultPolicy::Strict {
        if let Some((snapshot, error)) = failures().next() {
            return Resolution::Failed(FailureReason::Positioning { snapshot, kind: error.kind });
        }
    }
    if !results.values().any(|o| o.estimate().is_some()) {
        return Resolution::Failed(FailureReason::NoEstimates);
    }
    Resolution::Complete
}

/// Whether a job that is still missing navigation data has waited long
/// enough to be failed instead of released again.
pub fn starved(job: &Job, config: &WorkerConfig, now: DateTime<Utc>) -> Option<FailureReason> {
    let too_many = config.max_deferrals.is_some_and(|max| job.deferrals >= max);
    let too_old = config.max_wait.is_some_and(|max| {
        chrono::Duration::from_std(max).is_ok_and(|max| job.age(now) >= max)
    });
    (too_many || too_old)
        .then_some(FailureReason::NavigationDataUnavailable { deferrals: job.deferrals })
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
