// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stale-job reaper
//!
//! A worker that crashes mid-batch leaves its job in `processing` forever.
//! The reaper returns such jobs to `waiting` once their heartbeat is older
//! than a threshold; the next claimer resumes from the stored results.

use sq_core::JobId;
use sq_storage::{JobStore, StoreError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Reaper<S> {
    store: S,
    stale_after: Duration,
    interval: Duration,
}

impl<S: JobStore> Reaper<S> {
    /// Requeue jobs silent for `stale_after`, checking every `interval`.
    pub fn new(store: S, stale_after: Duration, interval: Duration) -> Self {
        Self { store, stale_after, interval }
    }

    /// Check interval derived from the threshold: a quarter of it, at least
    /// one second.
    pub fn default_interval(stale_after: Duration) -> Duration {
        (stale_after / 4).max(Duration::from_secs(1))
    }

    pub async fn sweep(&self) -> Result<Vec<JobId>, StoreError> {
        let requeued = self.store.requeue_stale(self.stale_after).await?;
        for job_id in &requeued {
            warn!(%job_id, "owner stopped heartbeating, job requeued");
        }
        Ok(requeued)
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        info!(stale_after_secs = self.stale_after.as_secs(), "reaper started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "reaper sweep failed");
            }
        }
        info!("reaper stopped");
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
