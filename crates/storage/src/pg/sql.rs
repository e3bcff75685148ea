// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal SQL operations on the job tables.
//!
//! Every mutation is one statement. Transitions out of `processing` are
//! conditional on the caller being the owner; when the condition does not
//! match, the row as it was before the statement is returned so the caller
//! can tell a lost job from an invalid transition.

use chrono::{DateTime, Utc};
use sq_core::{FailureReason, JobHints, NewJob, Snapshot, SnapshotOutcome};
use sqlx::types::Json;
use sqlx::{Executor, Postgres};

#[derive(Debug, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub owner: Option<String>,
    pub deferrals: i32,
    pub retry_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub notify_email: Option<String>,
    pub notify_push: Option<String>,
    pub notify_chat_id: Option<String>,
    pub hints: Json<JobHints>,
    pub failure: Option<Json<FailureReason>>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub idx: i32,
    pub captured_at: DateTime<Utc>,
    pub constellations: String,
    pub temperature: Option<f64>,
    pub data: Vec<u8>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ResultRow {
    pub idx: i32,
    pub outcome: Json<SnapshotOutcome>,
}

/// Result of an owner-guarded update: `updated` is set when the row changed,
/// otherwise `status`/`owner` hold the row as it was.
#[derive(Debug, sqlx::FromRow)]
pub struct GuardedUpdate {
    pub updated: Option<i32>,
    pub status: Option<String>,
    pub owner: Option<String>,
}

pub async fn insert_job<'c, E>(exe: E, job: &NewJob) -> Result<DateTime<Utc>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO jobs (id, notify_email, notify_push, notify_chat_id, hints, not_before)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING created_at
    "#};
    sqlx::query_scalar(query)
        .bind(job.id.as_str())
        .bind(job.notify_targets.email.as_deref())
        .bind(job.notify_targets.push.as_deref())
        .bind(job.notify_targets.chat_id.as_deref())
        .bind(Json(&job.hints))
        .bind(job.not_before)
        .fetch_one(exe)
        .await
}

pub async fn insert_snapshot<'c, E>(
    exe: E,
    job_id: &str,
    idx: i32,
    snapshot: &Snapshot,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO job_snapshots (job_id, idx, captured_at, constellations, temperature, data)
        VALUES ($1, $2, $3, $4, $5, $6)
    "#};
    let codes: String = snapshot.constellations.iter().map(|c| c.code()).collect();
    sqlx::query(query)
        .bind(job_id)
        .bind(idx)
        .bind(snapshot.captured_at)
        .bind(codes)
        .bind(snapshot.temperature)
        .bind(&snapshot.data)
        .execute(exe)
        .await?;
    Ok(())
}

pub async fn get_job<'c, E>(exe: E, id: &str) -> Result<Option<JobRow>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT
            id,
            status,
            created_at,
            owner,
            deferrals,
            retry_at,
            not_before,
            heartbeat_at,
            notify_email,
            notify_push,
            notify_chat_id,
            hints,
            failure
        FROM jobs
        WHERE id = $1
    "#};
    sqlx::query_as(query).bind(id).fetch_optional(exe).await
}

pub async fn get_snapshots<'c, E>(exe: E, job_id: &str) -> Result<Vec<SnapshotRow>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT idx, captured_at, constellations, temperature, data
        FROM job_snapshots
        WHERE job_id = $1
        ORDER BY idx ASC
    "#};
    sqlx::query_as(query).bind(job_id).fetch_all(exe).await
}

pub async fn get_results<'c, E>(exe: E, job_id: &str) -> Result<Vec<ResultRow>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        SELECT idx, outcome
        FROM job_results
        WHERE job_id = $1
        ORDER BY idx ASC
    "#};
    sqlx::query_as(query).bind(job_id).fetch_all(exe).await
}

/// Move the oldest claimable waiting job to `processing`.
///
/// `SKIP LOCKED` lets concurrent claimers pass over a row another
/// transaction is already claiming instead of queueing behind it; the outer
/// `status = 'waiting'` re-check makes the update a no-op if the row changed
/// in between.
pub async fn claim_oldest_waiting<'c, E>(exe: E, worker: &str) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE jobs
        SET status = 'processing',
            owner = $1,
            heartbeat_at = clock_timestamp(),
            updated_at = clock_timestamp()
        WHERE id = (
            SELECT id
            FROM jobs
            WHERE status = 'waiting'
              AND (retry_at IS NULL OR retry_at <= clock_timestamp())
              AND (not_before IS NULL OR not_before < clock_timestamp())
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        AND status = 'waiting'
        RETURNING id
    "#};
    sqlx::query_scalar(query).bind(worker).fetch_optional(exe).await
}

/// Fail a freshly claimed job whose row cannot be decoded.
pub async fn fail_unreadable<'c, E>(
    exe: E,
    id: &str,
    failure: &FailureReason,
) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE jobs
        SET status = 'failed',
            failure = $2,
            owner = NULL,
            heartbeat_at = NULL,
            retry_at = NULL,
            updated_at = clock_timestamp()
        WHERE id = $1 AND status = 'processing'
    "#};
    sqlx::query(query).bind(id).bind(Json(failure)).execute(exe).await?;
    Ok(())
}

/// Owner-guarded `processing → waiting`. `updated` carries the new deferral
/// count.
pub async fn release<'c, E>(
    exe: E,
    id: &str,
    worker: &str,
    backoff_secs: f64,
) -> Result<Option<GuardedUpdate>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        WITH target_job AS (
            SELECT id, status, owner
            FROM jobs
            WHERE id = $1
        ),
        target_job_update AS (
            UPDATE jobs
            SET status = 'waiting',
                owner = NULL,
                heartbeat_at = NULL,
                deferrals = deferrals + 1,
                retry_at = clock_timestamp() + make_interval(secs => $3),
                updated_at = clock_timestamp()
            WHERE id = $1 AND status = 'processing' AND owner = $2
            RETURNING id, deferrals
        )
        SELECT
            target_job_update.deferrals AS updated,
            target_job.status AS status,
            target_job.owner AS owner
        FROM target_job
        LEFT JOIN target_job_update ON target_job.id = target_job_update.id
    "#};
    sqlx::query_as(query).bind(id).bind(worker).bind(backoff_secs).fetch_optional(exe).await
}

/// Owner-guarded `processing → waiting` that leaves the deferral count and
/// `retry_at` untouched.
pub async fn hand_back<'c, E>(
    exe: E,
    id: &str,
    worker: &str,
) -> Result<Option<GuardedUpdate>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        WITH target_job AS (
            SELECT id, status, owner
            FROM jobs
            WHERE id = $1
        ),
        target_job_update AS (
            UPDATE jobs
            SET status = 'waiting',
                owner = NULL,
                heartbeat_at = NULL,
                updated_at = clock_timestamp()
            WHERE id = $1 AND status = 'processing' AND owner = $2
            RETURNING id, deferrals
        )
        SELECT
            target_job_update.deferrals AS updated,
            target_job.status AS status,
            target_job.owner AS owner
        FROM target_job
        LEFT JOIN target_job_update ON target_job.id = target_job_update.id
    "#};
    sqlx::query_as(query).bind(id).bind(worker).fetch_optional(exe).await
}

/// Owner-guarded `processing → complete | failed`.
pub async fn finalize<'c, E>(
    exe: E,
    id: &str,
    worker: &str,
    status: &str,
    failure: Option<&FailureReason>,
) -> Result<Option<GuardedUpdate>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        WITH target_job AS (
            SELECT id, status, owner
            FROM jobs
            WHERE id = $1
        ),
        target_job_update AS (
            UPDATE jobs
            SET status = $3,
                failure = $4,
                retry_at = NULL,
                updated_at = clock_timestamp()
            WHERE id = $1 AND status = 'processing' AND owner = $2
            RETURNING id, deferrals
        )
        SELECT
            target_job_update.deferrals AS updated,
            target_job.status AS status,
            target_job.owner AS owner
        FROM target_job
        LEFT JOIN target_job_update ON target_job.id = target_job_update.id
    "#};
    sqlx::query_as(query)
        .bind(id)
        .bind(worker)
        .bind(status)
        .bind(failure.map(Json))
        .fetch_optional(exe)
        .await
}

/// Insert or overwrite one snapshot outcome while the job is processing.
/// Returns the number of rows written (0 if the job is not processing).
pub async fn upsert_result<'c, E>(
    exe: E,
    job_id: &str,
    idx: i32,
    outcome: &SnapshotOutcome,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        INSERT INTO job_results (job_id, idx, outcome)
        SELECT id, $2, $3
        FROM jobs
        WHERE id = $1 AND status = 'processing'
        ON CONFLICT (job_id, idx)
        DO UPDATE SET outcome = EXCLUDED.outcome, written_at = clock_timestamp()
    "#};
    let res = sqlx::query(query).bind(job_id).bind(idx).bind(Json(outcome)).execute(exe).await?;
    Ok(res.rows_affected())
}

pub async fn get_status<'c, E>(exe: E, id: &str) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = "SELECT status FROM jobs WHERE id = $1";
    sqlx::query_scalar(query).bind(id).fetch_optional(exe).await
}

pub async fn heartbeat<'c, E>(exe: E, id: &str, worker: &str) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE jobs
        SET heartbeat_at = clock_timestamp()
        WHERE id = $1 AND status = 'processing' AND owner = $2
    "#};
    let res = sqlx::query(query).bind(id).bind(worker).execute(exe).await?;
    Ok(res.rows_affected())
}

/// Return processing jobs with a heartbeat older than `stale_secs` to waiting.
pub async fn requeue_stale<'c, E>(exe: E, stale_secs: f64) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE jobs
        SET status = 'waiting',
            owner = NULL,
            heartbeat_at = NULL,
            updated_at = clock_timestamp()
        WHERE status = 'processing'
          AND (heartbeat_at IS NULL
               OR heartbeat_at < clock_timestamp() - make_interval(secs => $1))
        RETURNING id
    "#};
    sqlx::query_scalar(query).bind(stale_secs).fetch_all(exe).await
}

pub async fn set_chat_target<'c, E>(exe: E, id: &str, chat_id: &str) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let query = indoc::indoc! {r#"
        UPDATE jobs
        SET notify_chat_id = $2, updated_at = clock_timestamp()
        WHERE id = $1
    "#};
    let res = sqlx::query(query).bind(id).bind(chat_id).execute(exe).await?;
    Ok(res.rows_affected())
}
