// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory job store for tests.
//!
//! A single mutex stands in for the database's row locking, so every
//! operation is atomic with respect to every other one, the same guarantee
//! the Postgres store gets from conditional updates.

use crate::error::StoreError;
use crate::store::JobStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use sq_core::{
    Clock, Job, JobId, JobStatus, NewJob, Resolution, SnapshotOutcome, SystemClock, WorkerId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MemoryState {
    jobs: BTreeMap<JobId, Job>,
    unavailable: bool,
    failing_writes: u32,
}

impl MemoryState {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn job_mut(&mut self, id: &JobId) -> Result<&mut Job, StoreError> {
        self.jobs.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

/// Job store backed by a shared in-process map.
///
/// Clones share state, so several workers built from clones of one store
/// behave like processes sharing one database.
#[derive(Clone)]
pub struct MemoryJobStore<C: Clock = SystemClock> {
    state: Arc<Mutex<MemoryState>>,
    clock: C,
}

impl MemoryJobStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryJobStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryJobStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { state: Arc::new(Mutex::new(MemoryState::default())), clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Simulate losing the database: every call fails with a transient error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Make the next `n` result writes fail with a transient error.
    pub fn fail_next_writes(&self, n: u32) {
        self.state.lock().failing_writes = n;
    }

    /// Current state of every job, ordered by id.
    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().jobs.values().cloned().collect()
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.state.lock().jobs.values().filter(|j| j.status == status).count()
    }

    /// Overwrite a job's heartbeat, for exercising the reaper.
    pub fn set_heartbeat(&self, id: &JobId, at: chrono::DateTime<chrono::Utc>) {
        if let Some(job) = self.state.lock().jobs.get_mut(id) {
            job.heartbeat_at = Some(at);
        }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

#[async_trait]
impl<C: Clock> JobStore for MemoryJobStore<C> {
    async fn enqueue(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        if state.jobs.contains_key(&new.id) {
            return Err(StoreError::Duplicate(new.id));
        }
        let job = Job::from_new(new, self.clock.utc_now());
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.jobs.get(id).cloned())
    }

    async fn claim_oldest_waiting(&self, worker: &WorkerId) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let now = self.clock.utc_now();
        let oldest = state
            .jobs
            .values()
            .filter(|j| j.is_claimable(now))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|j| j.id.clone());
        let Some(id) = oldest else {
            return Ok(None);
        };
        let job = state.job_mut(&id)?;
        job.status = JobStatus::Processing;
        job.owner = Some(worker.clone());
        job.heartbeat_at = Some(now);
        Ok(Some(job.clone()))
    }

    async fn release(
        &self,
        id: &JobId,
        worker: &WorkerId,
        backoff: Duration,
    ) -> Result<u32, StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let now = self.clock.utc_now();
        let job = state.job_mut(id)?;
        job.check_transition(worker, JobStatus::Waiting)?;
        job.status = JobStatus::Waiting;
        job.owner = None;
        job.heartbeat_at = None;
        job.deferrals += 1;
        job.retry_at = Some(now + chrono_duration(backoff));
        Ok(job.deferrals)
    }

    async fn hand_back(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let job = state.job_mut(id)?;
        job.check_transition(worker, JobStatus::Waiting)?;
        job.status = JobStatus::Waiting;
        job.owner = None;
        job.heartbeat_at = None;
        Ok(())
    }

    async fn write_result(
        &self,
        id: &JobId,
        index: usize,
        outcome: &SnapshotOutcome,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        let job = state.job_mut(id)?;
        if job.status != JobStatus::Processing {
            return Err(StoreError::NotProcessing { job_id: id.clone(), status: job.status });
        }
        if index >= job.snapshots.len() {
            return Err(StoreError::SnapshotOutOfRange { job_id: id.clone(), index });
        }
        job.results.insert(index, outcome.clone());
        Ok(())
    }

    async fn finalize(
        &self,
        id: &JobId,
        worker: &WorkerId,
        resolution: &Resolution,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let job = state.job_mut(id)?;
        job.check_transition(worker, resolution.status())?;
        job.status = resolution.status();
        job.failure = resolution.failure().cloned();
        job.retry_at = None;
        Ok(())
    }

    async fn heartbeat(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let now = self.clock.utc_now();
        let job = state.job_mut(id)?;
        if job.status != JobStatus::Processing || job.owner.as_ref() != Some(worker) {
            return Err(StoreError::OwnershipLost { job_id: id.clone() });
        }
        job.heartbeat_at = Some(now);
        Ok(())
    }

    async fn requeue_stale(&self, stale_after: Duration) -> Result<Vec<JobId>, StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let cutoff = self.clock.utc_now() - chrono_duration(stale_after);
        let mut requeued = Vec::new();
        for job in state.jobs.values_mut() {
            let stale = job.status == JobStatus::Processing
                && job.heartbeat_at.map_or(true, |at| at < cutoff);
            if stale {
                job.status = JobStatus::Waiting;
                job.owner = None;
                job.heartbeat_at = None;
                requeued.push(job.id.clone());
            }
        }
        Ok(requeued)
    }

    async fn set_chat_target(&self, id: &JobId, chat_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let job = state.job_mut(id)?;
        job.notify_targets.chat_id = Some(chat_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
