// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-core: job model and shared types for the snapq positioning workers

pub mod macros;

pub mod clock;
pub mod id;
pub mod job;
pub mod navigation;
pub mod snapshot;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    check_owned_transition, FailureReason, Job, JobHints, JobId, JobStatus, NewJob,
    NotifyTargets, ReferencePoint, Resolution, TransitionError, UnknownStatus,
};
pub use navigation::{last_needed_date, NavigationRequirement};
pub use snapshot::{
    Constellation, PositionEstimate, PositioningError, PositioningErrorKind, Snapshot,
    SnapshotOutcome,
};
pub use worker::WorkerId;
