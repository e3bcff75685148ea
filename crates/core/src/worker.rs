// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier.

crate::define_id! {
    /// Unique identifier for a worker process.
    ///
    /// Recorded as the `owner` of every job the worker claims. A fresh id is
    /// minted per process start so a restarted worker never inherits the
    /// ownership of jobs held by its crashed predecessor.
    pub struct WorkerId("wkr-");
}
