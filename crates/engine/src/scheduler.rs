// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch acquisition scheduler
//!
//! Runs the positioning engine over a claimed job's pending snapshots with a
//! bounded number in flight, writing each outcome to the store as soon as it
//! is known. The scheduler never finalizes; it hands the full outcome map back
//! to the worker once every snapshot has one.

use crate::retry;
use backon::Retryable;
use sq_adapters::{NavigationData, PositioningEngine};
use sq_core::{Job, JobId, PositioningError, PositioningErrorKind, SnapshotOutcome};
use sq_storage::{JobStore, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every snapshot has a stored outcome (including ones stored by an
    /// earlier attempt).
    Done(BTreeMap<usize, SnapshotOutcome>),
    /// The job stopped being ours mid-batch; in-flight estimates were aborted.
    Lost,
}

/// Bounded-parallel positioning of one job's snapshots.
#[derive(Clone)]
pub struct BatchScheduler<S, E> {
    store: S,
    engine: E,
    max_batch_size: usize,
    write_retries: usize,
}

impl<S: JobStore, E: PositioningEngine> BatchScheduler<S, E> {
    pub fn new(store: S, engine: E, max_batch_size: usize, write_retries: usize) -> Self {
        Self { store, engine, max_batch_size: max_batch_size.max(1), write_retries }
    }

    /// Position every snapshot of `job` that has no stored outcome yet.
    ///
    /// Snapshots captured outside the deployment window are recorded as
    /// [`SnapshotOutcome::OutsideDeployment`] without running the engine.
    /// `lost` is cancelled by the heartbeat when the store reports that the
    /// job was taken away; the batch then stops without writing anything
    /// further.
    pub async fn run(
        &self,
        job: &Job,
        navigation: Arc<NavigationData>,
        lost: &CancellationToken,
    ) -> Result<BatchOutcome, StoreError> {
        let mut results = job.results.clone();
        let (deployed, outside): (Vec<usize>, Vec<usize>) =
            job.pending_snapshots().into_iter().partition(|i| job.in_deployment(*i));
        for index in outside {
            debug!(job_id = %job.id, snapshot = index, "captured outside deployment, skipped");
            if !self.record(&job.id, index, SnapshotOutcome::OutsideDeployment, &mut results).await? {
                return Ok(BatchOutcome::Lost);
            }
        }

        let permits = Arc::new(Semaphore::new(self.max_batch_size));
        let hints = Arc::new(job.hints.clone());
        let mut tasks = JoinSet::new();
        let mut indices = HashMap::new();

        for index in deployed {
            let Some(snapshot) = job.snapshots.get(index).cloned() else { continue };
            let permits = Arc::clone(&permits);
            let engine = self.engine.clone();
            let navigation = Arc::clone(&navigation);
            let hints = Arc::clone(&hints);
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                engine.estimate(&snapshot, &navigation, &hints).await
            });
            indices.insert(handle.id(), index);
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = lost.cancelled() => {
                    tasks.abort_all();
                    return Ok(BatchOutcome::Lost);
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else { break };

            let (index, outcome) = match joined {
                Ok((id, result)) => (indices.remove(&id), SnapshotOutcome::from(result)),
                Err(e) => {
                    let message = if e.is_panic() { "engine panicked" } else { "engine task cancelled" };
                    (indices.remove(&e.id()), engine_failure(message))
                }
            };
            let Some(index) = index else { continue };

            if let SnapshotOutcome::Failed(error) = &outcome {
                debug!(job_id = %job.id, snapshot = index, error = %error, "snapshot not positioned");
            }

            match self.record(&job.id, index, outcome, &mut results).await {
                Ok(true) => {}
                Ok(false) => {
                    tasks.abort_all();
                    return Ok(BatchOutcome::Lost);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        Ok(BatchOutcome::Done(results))
    }

    /// Store one outcome and add it to `results`. `Ok(false)` means the job
    /// is no longer processing.
    async fn record(
        &self,
        job_id: &JobId,
        index: usize,
        outcome: SnapshotOutcome,
        results: &mut BTreeMap<usize, SnapshotOutcome>,
    ) -> Result<bool, StoreError> {
        match self.write(job_id, index, &outcome).await {
            Ok(()) => {
                results.insert(index, outcome);
                Ok(true)
            }
            Err(StoreError::NotProcessing { .. }) | Err(StoreError::NotFound(_)) => {
                warn!(%job_id, snapshot = index, "job left processing mid-batch, dropping");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn write(
        &self,
        job_id: &JobId,
        index: usize,
        outcome: &SnapshotOutcome,
    ) -> Result<(), StoreError> {
        (|| self.store.write_result(job_id, index, outcome))
            .retry(retry::store_policy(self.write_retries))
            .when(StoreError::is_transient)
            .notify(|err, dur| {
                warn!(
                    %job_id,
                    snapshot = index,
                    error = %err,
                    "store unavailable while writing result, retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await
    }
}

fn engine_failure(message: &str) -> SnapshotOutcome {
    SnapshotOutcome::Failed(PositioningError::new(PositioningErrorKind::Internal, message))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
