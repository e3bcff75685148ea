// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness signal for the job being processed.

use sq_core::{JobId, WorkerId};
use sq_storage::{JobStore, StoreError};
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// Stops the heartbeat task when dropped.
pub struct Heartbeat {
    _stop: DropGuard,
}

/// Refresh `job_id`'s heartbeat every `interval` until the returned guard is
/// dropped.
///
/// When the store says the job is no longer ours, `lost` is cancelled and the
/// task exits. Transient store errors are logged and the next beat retried.
pub fn spawn<S: JobStore>(
    store: S,
    job_id: JobId,
    worker: WorkerId,
    interval: Duration,
    lost: CancellationToken,
) -> Heartbeat {
    let stop = CancellationToken::new();
    let guard = stop.clone().drop_guard();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match store.heartbeat(&job_id, &worker).await {
                Ok(()) => debug!(%job_id, "heartbeat"),
                Err(e) if e.is_transient() => {
                    warn!(%job_id, error = %e, "heartbeat failed, store unavailable");
                }
                Err(e @ (StoreError::OwnershipLost { .. } | StoreError::NotFound(_))) => {
                    warn!(%job_id, error = %e, "heartbeat rejected, abandoning job");
                    lost.cancel();
                    break;
                }
                Err(e) => {
                    warn!(%job_id, error = %e, "heartbeat failed");
                }
            }
        }
    });

    Heartbeat { _stop: guard }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
