// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy for store calls that must not be dropped on a blip.

use backon::ExponentialBuilder;
use std::time::Duration;

/// Exponential backoff from 200ms up to 10s, at most `max_times` retries.
pub(crate) fn store_policy(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(max_times)
}
