// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job claimer and per-job state machine
//!
//! One worker process runs one [`Worker`]. Each tick claims the oldest
//! claimable job, checks that its navigation data is published, and either
//! hands it back (deferral) or positions it through the batch scheduler,
//! finalizes it and notifies the user. All coordination with other workers
//! goes through the store's conditional updates.

use crate::config::WorkerConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::RuntimeError;
use crate::heartbeat;
use crate::policy;
use crate::retry;
use crate::scheduler::{BatchOutcome, BatchScheduler};
use backon::Retryable;
use parking_lot::Mutex;
use sq_adapters::{NavigationIndex, PositioningEngine};
use sq_core::{Clock, FailureReason, Job, JobId, JobStatus, Resolution, SystemClock, WorkerId};
use sq_storage::{JobStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No claimable job left. `deferred` lists jobs handed back this tick
    /// because their navigation data is missing.
    Idle { deferred: Vec<JobId> },
    /// A job reached a terminal state.
    Finished { job_id: JobId, status: JobStatus, deferred: Vec<JobId> },
    /// The job was taken away from this worker before it could be finalized.
    Lost { job_id: JobId },
    /// The store could not be reached; counts as "no job claimed".
    Unavailable,
}

/// Result of handling one claimed job.
enum Step {
    Deferred(JobId),
    /// Handed back after a store outage, without counting a deferral.
    Requeued(JobId),
    Finished(JobId, JobStatus),
    Lost(JobId),
    /// The store stayed unreachable; a [`Pending`] write is recorded.
    Interrupted,
}

/// A store write that failed past its retries. The job stays `processing`
/// under this worker until the write is retried at the start of the next
/// tick.
enum Pending {
    Release { job_id: JobId, count_deferral: bool },
    Finalize { job: Job, resolution: Resolution },
}

pub struct Worker<S, N, E, C = SystemClock> {
    id: WorkerId,
    store: S,
    navigation: N,
    scheduler: BatchScheduler<S, E>,
    dispatcher: NotificationDispatcher,
    config: WorkerConfig,
    clock: C,
    pending: Mutex<Option<Pending>>,
}

impl<S, N, E> Worker<S, N, E, SystemClock>
where
    S: JobStore,
    N: NavigationIndex,
    E: PositioningEngine,
{
    pub fn new(
        id: WorkerId,
        store: S,
        navigation: N,
        engine: E,
        dispatcher: NotificationDispatcher,
        config: WorkerConfig,
    ) -> Self {
        Self::with_clock(id, store, navigation, engine, dispatcher, config, SystemClock)
    }
}

impl<S, N, E, C> Worker<S, N, E, C>
where
    S: JobStore,
    N: NavigationIndex,
    E: PositioningEngine,
    C: Clock,
{
    pub fn with_clock(
        id: WorkerId,
        store: S,
        navigation: N,
        engine: E,
        dispatcher: NotificationDispatcher,
        config: WorkerConfig,
        clock: C,
    ) -> Self {
        let scheduler = BatchScheduler::new(
            store.clone(),
            engine,
            config.max_batch_size,
            config.write_retries,
        );
        Self { id, store, navigation, scheduler, dispatcher, config, clock, pending: Mutex::new(None) }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// After a finished job the next tick starts immediately; an idle or
    /// unreachable store waits a full poll interval. Cancellation is only
    /// observed between ticks, so an in-flight batch always runs to the end.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), RuntimeError> {
        self.config.validate()?;
        info!(
            worker = %self.id,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_batch_size = self.config.max_batch_size,
            interactive = self.config.interactive,
            "worker started"
        );

        let mut pause = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            pause = match self.tick().await? {
                TickOutcome::Finished { .. } | TickOutcome::Lost { .. } => Duration::ZERO,
                TickOutcome::Idle { .. } | TickOutcome::Unavailable => self.config.poll_interval,
            };
        }

        info!(worker = %self.id, "worker stopped");
        Ok(())
    }

    /// Claim and handle jobs until one is processed or none is claimable.
    ///
    /// Jobs whose navigation data is missing are released and the next
    /// oldest one is claimed, so a starving job never blocks younger ones.
    /// At most one job is processed per tick. A store write left over from
    /// an earlier tick is applied before anything new is claimed.
    pub async fn tick(&self) -> Result<TickOutcome, RuntimeError> {
        let mut deferred: Vec<JobId> = Vec::new();
        match self.settle_pending().await? {
            None | Some(Step::Requeued(_)) => {}
            Some(Step::Deferred(job_id)) => deferred.push(job_id),
            Some(step) => return Ok(conclude(step, deferred)),
        }

        loop {
            let job = match self.store.claim_oldest_waiting(&self.id).await {
                Ok(Some(job)) => job,
                Ok(None) => return Ok(TickOutcome::Idle { deferred }),
                Err(e) if e.is_transient() => {
                    warn!(worker = %self.id, error = %e, "store unavailable, skipping tick");
                    return Ok(TickOutcome::Unavailable);
                }
                Err(e) => return Err(e.into()),
            };
            debug!(worker = %self.id, job_id = %job.id, deferrals = job.deferrals, "claimed job");

            let step = match self.handle(job).await {
                Ok(step) => step,
                Err(e) if e.is_transient() => {
                    warn!(worker = %self.id, error = %e, "store unavailable mid-job");
                    return Ok(TickOutcome::Unavailable);
                }
                Err(e) => return Err(e),
            };

            match step {
                Step::Deferred(job_id) => {
                    // Backoff shorter than one pass over the queue; give up on this tick.
                    if deferred.contains(&job_id) {
                        return Ok(TickOutcome::Idle { deferred });
                    }
                    deferred.push(job_id);
                }
                step => return Ok(conclude(step, deferred)),
            }
        }
    }

    async fn handle(&self, job: Job) -> Result<Step, RuntimeError> {
        if job.snapshots.is_empty() {
            let reason = FailureReason::Rejected { message: "upload contains no snapshots".to_string() };
            return self.finish(job, Resolution::Failed(reason)).await;
        }

        let requirement = job.navigation_requirement();
        let available = match self.navigation.is_available(&requirement).await {
            Ok(available) => available,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "navigation index lookup failed");
                false
            }
        };
        if !available {
            return self.defer(job).await;
        }

        let navigation = match self.navigation.locate(&requirement).await {
            Ok(data) => Arc::new(data),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "navigation data vanished after check");
                return self.defer(job).await;
            }
        };

        let lost = CancellationToken::new();
        let _heartbeat = heartbeat::spawn(
            self.store.clone(),
            job.id.clone(),
            self.id.clone(),
            self.config.heartbeat_interval,
            lost.clone(),
        );

        info!(
            job_id = %job.id,
            snapshots = job.snapshots.len(),
            pending = job.pending_snapshots().len(),
            "positioning job"
        );
        let results = match self.scheduler.run(&job, navigation, &lost).await {
            Ok(BatchOutcome::Done(results)) => results,
            Ok(BatchOutcome::Lost) => {
                warn!(job_id = %job.id, worker = %self.id, "ownership lost mid-batch, dropping job");
                return Ok(Step::Lost(job.id));
            }
            Err(e) if e.is_transient() => {
                warn!(job_id = %job.id, error = %e, "store unavailable mid-batch, handing job back");
                return self.put_back(job.id, false).await;
            }
            Err(e) => return Err(e.into()),
        };

        let resolution = policy::resolve(&results, self.config.result_policy);
        self.finish(job, resolution).await
    }

    /// Release a job whose navigation data is missing, or fail it when it has
    /// waited too long.
    async fn defer(&self, job: Job) -> Result<Step, RuntimeError> {
        if let Some(reason) = policy::starved(&job, &self.config, self.clock.utc_now()) {
            warn!(job_id = %job.id, deferrals = job.deferrals, "navigation data never arrived, failing job");
            return self.finish(job, Resolution::Failed(reason)).await;
        }
        self.put_back(job.id, true).await
    }

    /// Return a claimed job to the queue. `count_deferral` distinguishes a
    /// deferral for missing navigation data from handing back a job the
    /// store interrupted.
    async fn put_back(&self, job_id: JobId, count_deferral: bool) -> Result<Step, RuntimeError> {
        let returned = if count_deferral {
            self.release(&job_id).await.map(Some)
        } else {
            self.hand_back(&job_id).await.map(|()| None)
        };

        match returned {
            Ok(Some(deferrals)) => {
                info!(%job_id, deferrals, "navigation data unavailable, job deferred");
                Ok(Step::Deferred(job_id))
            }
            Ok(None) => {
                info!(%job_id, "job handed back");
                Ok(Step::Requeued(job_id))
            }
            Err(e) if e.is_transient() => {
                error!(%job_id, error = %e, "could not return job to the queue, retrying next tick");
                self.set_pending(Pending::Release { job_id, count_deferral });
                Ok(Step::Interrupted)
            }
            Err(e @ (StoreError::OwnershipLost { .. } | StoreError::InvalidTransition { .. })) => {
                warn!(%job_id, worker = %self.id, error = %e, "release rejected");
                Ok(Step::Lost(job_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn finish(&self, job: Job, resolution: Resolution) -> Result<Step, RuntimeError> {
        let finalized = (|| self.store.finalize(&job.id, &self.id, &resolution))
            .retry(retry::store_policy(self.config.write_retries))
            .when(StoreError::is_transient)
            .notify(|err, dur| {
                warn!(
                    job_id = %job.id,
                    error = %err,
                    "store unavailable while finalizing, retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await;

        match finalized {
            Ok(()) => {}
            // Only the owner sees its own job as already terminal: an earlier
            // attempt committed but its reply was lost.
            Err(StoreError::InvalidTransition { from, to, .. }) if from == to => {
                debug!(job_id = %job.id, status = %to, "job already finalized by this worker");
            }
            Err(e @ (StoreError::OwnershipLost { .. } | StoreError::InvalidTransition { .. })) => {
                warn!(job_id = %job.id, worker = %self.id, error = %e, "finalize rejected, dropping result");
                return Ok(Step::Lost(job.id));
            }
            Err(e) if e.is_transient() => {
                error!(job_id = %job.id, error = %e, "could not finalize job, retrying next tick");
                self.set_pending(Pending::Finalize { job, resolution });
                return Ok(Step::Interrupted);
            }
            Err(e) => return Err(e.into()),
        }

        let status = resolution.status();
        match resolution.failure() {
            None => info!(job_id = %job.id, %status, "job finalized"),
            Some(reason) => info!(job_id = %job.id, %status, reason = %reason, "job finalized"),
        }

        // Targets may have changed while the batch ran (chat registration).
        let job = match self.store.get(&job.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => job,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "could not refresh notify targets");
                job
            }
        };
        self.dispatcher.notify(&job, &resolution).await;

        Ok(Step::Finished(job.id, status))
    }

    /// Retry the store write an earlier tick could not apply.
    async fn settle_pending(&self) -> Result<Option<Step>, RuntimeError> {
        let pending = self.pending.lock().take();
        let step = match pending {
            None => return Ok(None),
            Some(Pending::Release { job_id, count_deferral }) => {
                debug!(%job_id, count_deferral, "retrying release");
                self.put_back(job_id, count_deferral).await?
            }
            Some(Pending::Finalize { job, resolution }) => {
                debug!(job_id = %job.id, "retrying finalize");
                self.finish(job, resolution).await?
            }
        };
        Ok(Some(step))
    }

    fn set_pending(&self, pending: Pending) {
        *self.pending.lock() = Some(pending);
    }

    async fn release(&self, job_id: &JobId) -> Result<u32, StoreError> {
        (|| self.store.release(job_id, &self.id, self.config.deferral_backoff))
            .retry(retry::store_policy(self.config.write_retries))
            .when(StoreError::is_transient)
            .notify(|err, dur| {
                warn!(
                    %job_id,
                    error = %err,
                    "store unavailable while releasing, retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await
    }

    async fn hand_back(&self, job_id: &JobId) -> Result<(), StoreError> {
        (|| self.store.hand_back(job_id, &self.id))
            .retry(retry::store_policy(self.config.write_retries))
            .when(StoreError::is_transient)
            .notify(|err, dur| {
                warn!(
                    %job_id,
                    error = %err,
                    "store unavailable while handing back, retrying in {:.1}s",
                    dur.as_secs_f32()
                );
            })
            .await
    }
}

fn conclude(step: Step, deferred: Vec<JobId>) -> TickOutcome {
    match step {
        Step::Finished(job_id, status) => TickOutcome::Finished { job_id, status, deferred },
        Step::Lost(job_id) => TickOutcome::Lost { job_id },
        Step::Deferred(_) => TickOutcome::Idle { deferred },
        Step::Requeued(_) | Step::Interrupted => TickOutcome::Unavailable,
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
