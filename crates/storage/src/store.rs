// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The shared job table contract.

use crate::error::StoreError;
use async_trait::async_trait;
use sq_core::{Job, JobId, NewJob, Resolution, SnapshotOutcome, WorkerId};
use std::time::Duration;

/// Shared, transactional store of jobs.
///
/// This is the only state shared between worker processes. Every mutation is
/// a single conditional update whose atomicity comes from the backing store;
/// implementations must never rely on in-process locking for cross-worker
/// correctness.
///
/// Timestamps (`created_at`, `retry_at`, `heartbeat_at`) are assigned with the
/// store's own clock so that workers with skewed clocks agree on ordering.
#[async_trait]
pub trait JobStore: Clone + Send + Sync + 'static {
    /// Insert a new `waiting` job. Used by the upload side and by tests.
    async fn enqueue(&self, job: NewJob) -> Result<Job, StoreError>;

    /// Read a job with its snapshots and stored results.
    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Atomically move the oldest claimable `waiting` job to `processing`
    /// with `worker` as owner.
    ///
    /// Concurrent callers never receive the same job. A job is claimable when
    /// it is `waiting` and its `retry_at` (if any) has passed.
    async fn claim_oldest_waiting(&self, worker: &WorkerId) -> Result<Option<Job>, StoreError>;

    /// Compensating release: `processing` back to `waiting`, owner-guarded.
    ///
    /// `created_at` is preserved, the deferral counter is incremented and the
    /// job becomes claimable again after `backoff`. Returns the new deferral
    /// count.
    async fn release(
        &self,
        id: &JobId,
        worker: &WorkerId,
        backoff: Duration,
    ) -> Result<u32, StoreError>;

    /// Return a job the caller could not finish to `waiting`, owner-guarded.
    ///
    /// Unlike [`release`](Self::release) this is not a deferral: the
    /// deferral counter and `retry_at` are left alone, so the job is
    /// claimable again immediately and keeps its place in the queue.
    async fn hand_back(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError>;

    /// Store the outcome of one snapshot. Overwrites any previous outcome
    /// for the same index, so retries are safe.
    async fn write_result(
        &self,
        id: &JobId,
        index: usize,
        outcome: &SnapshotOutcome,
    ) -> Result<(), StoreError>;

    /// Move a `processing` job owned by `worker` to its terminal state.
    ///
    /// Fails with [`StoreError::OwnershipLost`] if the caller is not the
    /// current owner; the job is left untouched.
    async fn finalize(
        &self,
        id: &JobId,
        worker: &WorkerId,
        resolution: &Resolution,
    ) -> Result<(), StoreError>;

    /// Refresh the liveness timestamp of a job the caller is processing.
    async fn heartbeat(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError>;

    /// Return `processing` jobs whose last heartbeat is older than
    /// `stale_after` to `waiting`, clearing the owner. Stored results are kept.
    async fn requeue_stale(&self, stale_after: Duration) -> Result<Vec<JobId>, StoreError>;

    /// Record the interactive chat id to notify when the job finishes.
    async fn set_chat_target(&self, id: &JobId, chat_id: &str) -> Result<(), StoreError>;
}
