// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres-backed job store shared by every worker process.

mod conn;
mod sql;

pub use conn::{DbConnPool, ACQUIRE_TIMEOUT};

use crate::error::StoreError;
use crate::store::JobStore;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use sq_core::{
    check_owned_transition, Constellation, FailureReason, Job, JobId, JobStatus, NewJob, NotifyTargets,
    Resolution, Snapshot, SnapshotOutcome, WorkerId,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{instrument, warn};

/// Default number of pooled connections per worker process.
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Job store on a shared Postgres database.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: DbConnPool,
}

impl PgJobStore {
    /// Connect and bring the schema up to date.
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let pool = DbConnPool::connect(url, pool_size).await?;
        pool.run_migrations().await?;
        Ok(Self { pool })
    }

    /// Like [`connect`](Self::connect), but keeps retrying while the database
    /// is unreachable or still starting up.
    #[instrument(skip_all, err)]
    pub async fn connect_with_retry(
        url: &str,
        pool_size: u32,
        max_attempts: usize,
    ) -> Result<Self, StoreError> {
        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10))
            .with_max_times(max_attempts);

        fn is_retryable(err: &StoreError) -> bool {
            err.is_transient() || is_db_starting_up(err)
        }

        fn notify_retry(err: &StoreError, dur: Duration) {
            tracing::warn!(
                error = %err,
                "database not ready, retrying in {:.1}s",
                dur.as_secs_f32()
            );
        }

        let pool = (|| DbConnPool::connect(url, pool_size))
            .retry(retry_policy)
            .when(is_retryable)
            .notify(notify_retry)
            .await?;
        pool.run_migrations().await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbConnPool {
        &self.pool
    }

    async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let job = load_in(&mut tx, id).await?;
        tx.commit().await?;
        Ok(job)
    }
}

/// Postgres reports `57P03 cannot_connect_now` while the server is booting.
fn is_db_starting_up(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(sqlx::Error::Database(db_err))
            if db_err.code().is_some_and(|code| code == "57P03")
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| e.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|e| e.is_foreign_key_violation())
}

fn parse_status(job_id: &str, status: &str) -> Result<JobStatus, StoreError> {
    status
        .parse()
        .map_err(|e: sq_core::UnknownStatus| StoreError::Corrupt {
            job_id: JobId::from(job_id),
            message: e.to_string(),
        })
}

fn index_to_i32(job_id: &JobId, index: usize) -> Result<i32, StoreError> {
    i32::try_from(index)
        .map_err(|_| StoreError::SnapshotOutOfRange { job_id: job_id.clone(), index })
}

/// Decode failures are a property of the row, not of the connection.
fn undecodable(job_id: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |err| match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt { job_id: JobId::from(job_id), message: err.to_string() }
        }
        other => other.into(),
    }
}

async fn load_in(conn: &mut sqlx::PgConnection, id: &str) -> Result<Option<Job>, StoreError> {
    let Some(row) = sql::get_job(&mut *conn, id).await.map_err(undecodable(id))? else {
        return Ok(None);
    };
    let snapshots = sql::get_snapshots(&mut *conn, id).await.map_err(undecodable(id))?;
    let results = sql::get_results(&mut *conn, id).await.map_err(undecodable(id))?;
    row_to_job(row, snapshots, results).map(Some)
}

fn row_to_job(
    row: sql::JobRow,
    snapshots: Vec<sql::SnapshotRow>,
    results: Vec<sql::ResultRow>,
) -> Result<Job, StoreError> {
    let status = parse_status(&row.id, &row.status)?;
    let job_id = JobId::from(row.id);
    let corrupt = |message: String| StoreError::Corrupt { job_id: job_id.clone(), message };

    let mut decoded = Vec::with_capacity(snapshots.len());
    for (expected, snap) in snapshots.into_iter().enumerate() {
        if usize::try_from(snap.idx).ok() != Some(expected) {
            return Err(corrupt(format!("snapshot index gap at {}", expected)));
        }
        let constellations = snap
            .constellations
            .chars()
            .map(|c| {
                Constellation::from_code(c)
                    .ok_or_else(|| corrupt(format!("unknown constellation code '{}'", c)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        decoded.push(Snapshot {
            captured_at: snap.captured_at,
            constellations,
            temperature: snap.temperature,
            data: snap.data,
        });
    }

    let mut outcomes = BTreeMap::new();
    for result in results {
        let idx = usize::try_from(result.idx)
            .map_err(|_| corrupt(format!("negative result index {}", result.idx)))?;
        outcomes.insert(idx, result.outcome.0);
    }

    Ok(Job {
        id: job_id.clone(),
        status,
        created_at: row.created_at,
        owner: row.owner.map(WorkerId::from),
        deferrals: u32::try_from(row.deferrals).unwrap_or_default(),
        retry_at: row.retry_at,
        not_before: row.not_before,
        heartbeat_at: row.heartbeat_at,
        snapshots: decoded,
        results: outcomes,
        notify_targets: NotifyTargets {
            email: row.notify_email,
            push: row.notify_push,
            chat_id: row.notify_chat_id,
        },
        hints: row.hints.0,
        failure: row.failure.map(|f| f.0),
    })
}

/// Turn the pre-update row of a guarded update that changed nothing into the
/// matching error.
fn classify_miss(
    id: &JobId,
    worker: &WorkerId,
    to: JobStatus,
    prior: Option<sql::GuardedUpdate>,
) -> StoreError {
    let Some(prior) = prior else {
        return StoreError::NotFound(id.clone());
    };
    let status = match prior.status.as_deref().map(|s| parse_status(id.as_str(), s)) {
        Some(Ok(status)) => status,
        Some(Err(e)) => return e,
        None => return StoreError::NotFound(id.clone()),
    };
    let owner = prior.owner.map(WorkerId::from);
    match check_owned_transition(id, status, owner.as_ref(), worker, to) {
        Err(e) => e.into(),
        // Row matched the guard but the update did not apply: it changed
        // between the snapshot and the update.
        Ok(()) => StoreError::OwnershipLost { job_id: id.clone() },
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip_all, fields(job_id = %job.id), err)]
    async fn enqueue(&self, job: NewJob) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        let created_at = match sql::insert_job(&mut *tx, &job).await {
            Ok(at) => at,
            Err(e) if is_unique_violation(&e) => return Err(StoreError::Duplicate(job.id)),
            Err(e) => return Err(e.into()),
        };
        for (idx, snapshot) in job.snapshots.iter().enumerate() {
            let idx = index_to_i32(&job.id, idx)?;
            sql::insert_snapshot(&mut *tx, job.id.as_str(), idx, snapshot).await?;
        }
        tx.commit().await?;
        Ok(Job::from_new(job, created_at))
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.load(id.as_str()).await
    }

    /// A claimed row that cannot be decoded is failed in the same
    /// transaction and the next one is claimed, so it never reaches a worker
    /// and never blocks the queue.
    #[instrument(skip_all, fields(worker = %worker))]
    async fn claim_oldest_waiting(&self, worker: &WorkerId) -> Result<Option<Job>, StoreError> {
        loop {
            let mut tx = self.pool.begin().await?;
            let Some(id) = sql::claim_oldest_waiting(&mut *tx, worker.as_str()).await? else {
                return Ok(None);
            };
            match load_in(&mut tx, &id).await {
                Ok(job) => {
                    tx.commit().await?;
                    return Ok(job);
                }
                Err(StoreError::Corrupt { job_id, message }) => {
                    let reason = FailureReason::Rejected {
                        message: format!("stored upload is unreadable: {}", message),
                    };
                    sql::fail_unreadable(&mut *tx, &id, &reason).await?;
                    tx.commit().await?;
                    warn!(%job_id, %message, "unreadable job failed at claim");
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip_all, fields(job_id = %id, worker = %worker), err)]
    async fn release(
        &self,
        id: &JobId,
        worker: &WorkerId,
        backoff: Duration,
    ) -> Result<u32, StoreError> {
        let res =
            sql::release(&*self.pool, id.as_str(), worker.as_str(), backoff.as_secs_f64()).await?;
        match res {
            Some(sql::GuardedUpdate { updated: Some(deferrals), .. }) => {
                Ok(u32::try_from(deferrals).unwrap_or_default())
            }
            prior => Err(classify_miss(id, worker, JobStatus::Waiting, prior)),
        }
    }

    #[instrument(skip_all, fields(job_id = %id, worker = %worker), err)]
    async fn hand_back(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError> {
        match sql::hand_back(&*self.pool, id.as_str(), worker.as_str()).await? {
            Some(sql::GuardedUpdate { updated: Some(_), .. }) => Ok(()),
            prior => Err(classify_miss(id, worker, JobStatus::Waiting, prior)),
        }
    }

    async fn write_result(
        &self,
        id: &JobId,
        index: usize,
        outcome: &SnapshotOutcome,
    ) -> Result<(), StoreError> {
        let idx = index_to_i32(id, index)?;
        let written = match sql::upsert_result(&*self.pool, id.as_str(), idx, outcome).await {
            Ok(n) => n,
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(StoreError::SnapshotOutOfRange { job_id: id.clone(), index });
            }
            Err(e) => return Err(e.into()),
        };
        if written > 0 {
            return Ok(());
        }
        match sql::get_status(&*self.pool, id.as_str()).await? {
            None => Err(StoreError::NotFound(id.clone())),
            Some(status) => Err(StoreError::NotProcessing {
                job_id: id.clone(),
                status: parse_status(id.as_str(), &status)?,
            }),
        }
    }

    #[instrument(skip_all, fields(job_id = %id, worker = %worker), err)]
    async fn finalize(
        &self,
        id: &JobId,
        worker: &WorkerId,
        resolution: &Resolution,
    ) -> Result<(), StoreError> {
        let to = resolution.status();
        let res = sql::finalize(
            &*self.pool,
            id.as_str(),
            worker.as_str(),
            to.as_str(),
            resolution.failure(),
        )
        .await?;
        match res {
            Some(sql::GuardedUpdate { updated: Some(_), .. }) => Ok(()),
            prior => Err(classify_miss(id, worker, to, prior)),
        }
    }

    async fn heartbeat(&self, id: &JobId, worker: &WorkerId) -> Result<(), StoreError> {
        match sql::heartbeat(&*self.pool, id.as_str(), worker.as_str()).await? {
            0 => Err(StoreError::OwnershipLost { job_id: id.clone() }),
            _ => Ok(()),
        }
    }

    #[instrument(skip_all, err)]
    async fn requeue_stale(&self, stale_after: Duration) -> Result<Vec<JobId>, StoreError> {
        let ids = sql::requeue_stale(&*self.pool, stale_after.as_secs_f64()).await?;
        Ok(ids.into_iter().map(JobId::from).collect())
    }

    async fn set_chat_target(&self, id: &JobId, chat_id: &str) -> Result<(), StoreError> {
        match sql::set_chat_target(&*self.pool, id.as_str(), chat_id).await? {
            0 => Err(StoreError::NotFound(id.clone())),
            _ => Ok(()),
        }
    }
}
