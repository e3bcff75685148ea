// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Job store contract against a real Postgres server.

use sq_core::test_support::{epoch, estimate, new_job};
use sq_core::{FailureReason, JobId, JobStatus, Resolution, SnapshotOutcome, WorkerId};
use sq_storage::temp::TempJobStore;
use sq_storage::{JobStore, StoreError};
use sqlx::types::Json;
use std::collections::HashSet;
use std::time::Duration;

async fn temp_store() -> TempJobStore {
    TempJobStore::new(8).await.expect("failed to start temp database")
}

#[tokio::test]
async fn enqueue_and_get_round_trip() {
    //* Given
    let store = temp_store().await;
    let mut job = new_job("3fa9c01b7e", epoch(), 3);
    job.notify_targets.email = Some("user@example.com".into());

    //* When
    let created = store.enqueue(job).await.unwrap();
    let loaded = store.get(&created.id).await.unwrap().unwrap();

    //* Then
    assert_eq!(loaded.status, JobStatus::Waiting);
    assert_eq!(loaded.snapshots, created.snapshots);
    assert_eq!(loaded.notify_targets.email.as_deref(), Some("user@example.com"));
    assert!(loaded.results.is_empty());

    let err = store.enqueue(new_job("3fa9c01b7e", epoch(), 1)).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[tokio::test]
async fn concurrent_workers_claim_disjoint_jobs() {
    //* Given
    let store = temp_store().await;
    for i in 0..10 {
        store.enqueue(new_job(&format!("job-{i:02}"), epoch(), 1)).await.unwrap();
    }

    //* When
    let mut handles = Vec::new();
    for w in 0..2 {
        let pool = store.connect_another(4).await.unwrap();
        handles.push(tokio::spawn(async move {
            let me = WorkerId::from(format!("wkr-{w}"));
            let mut mine = Vec::new();
            while let Some(job) = pool.claim_oldest_waiting(&me).await.unwrap() {
                assert_eq!(job.owner.as_ref(), Some(&me));
                mine.push(job.id);
            }
            mine
        }));
    }

    //* Then
    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id.clone()), "job {id} claimed by two workers");
        }
    }
    assert_eq!(seen.len(), 10);
}

#[tokio::test]
async fn released_job_keeps_its_place_in_line() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 1)).await.unwrap();
    store.enqueue(new_job("b", epoch(), 1)).await.unwrap();
    let w = WorkerId::from("wkr-1");

    //* When
    let a = store.claim_oldest_waiting(&w).await.unwrap().unwrap();
    let deferrals = store.release(&a.id, &w, Duration::ZERO).await.unwrap();
    let next = store.claim_oldest_waiting(&w).await.unwrap().unwrap();

    //* Then
    assert_eq!(deferrals, 1);
    assert_eq!(next.id, a.id);
    assert_eq!(next.created_at, a.created_at);
    assert_eq!(next.deferrals, 1);
}

#[tokio::test]
async fn backoff_defers_the_released_job() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 1)).await.unwrap();
    store.enqueue(new_job("b", epoch(), 1)).await.unwrap();
    let w = WorkerId::from("wkr-1");

    //* When
    let a = store.claim_oldest_waiting(&w).await.unwrap().unwrap();
    store.release(&a.id, &w, Duration::from_secs(3600)).await.unwrap();
    let next = store.claim_oldest_waiting(&w).await.unwrap().unwrap();

    //* Then
    assert_eq!(next.id, "b");
    assert_eq!(store.claim_oldest_waiting(&w).await.unwrap(), None);
}

#[tokio::test]
async fn held_back_job_is_not_claimed_early() {
    //* Given
    let store = temp_store().await;
    let later = chrono::Utc::now() + chrono::Duration::hours(1);
    store.enqueue(new_job("held", epoch(), 1).with_not_before(later)).await.unwrap();
    store.enqueue(new_job("ready", epoch(), 1)).await.unwrap();
    let w = WorkerId::from("wkr-1");

    //* When
    let first = store.claim_oldest_waiting(&w).await.unwrap().unwrap();
    let second = store.claim_oldest_waiting(&w).await.unwrap();

    //* Then
    assert_eq!(first.id, "ready");
    assert_eq!(second, None);
    let held = store.get(&JobId::from("held")).await.unwrap().unwrap();
    assert_eq!(held.status, JobStatus::Waiting);
    assert_eq!(held.not_before.map(|t| t.timestamp()), Some(later.timestamp()));
}

#[tokio::test]
async fn hand_back_leaves_the_deferral_count_alone() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 1)).await.unwrap();
    let w = WorkerId::from("wkr-1");
    let a = store.claim_oldest_waiting(&w).await.unwrap().unwrap();
    store.release(&a.id, &w, Duration::ZERO).await.unwrap();
    store.claim_oldest_waiting(&w).await.unwrap().unwrap();

    //* When
    store.hand_back(&a.id, &w).await.unwrap();
    let twice = store.hand_back(&a.id, &w).await;

    //* Then
    let job = store.get(&a.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Waiting);
    assert_eq!(job.owner, None);
    assert_eq!(job.deferrals, 1);
    assert!(twice.unwrap_err().is_ownership_lost());
}

#[tokio::test]
async fn unreadable_job_is_failed_instead_of_blocking_the_queue() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("broken", epoch(), 2)).await.unwrap();
    store.enqueue(new_job("fine", epoch(), 1)).await.unwrap();
    sqlx::query("UPDATE job_snapshots SET constellations = '?' WHERE job_id = 'broken' AND idx = 1")
        .execute(&**store.pool())
        .await
        .unwrap();
    let w = WorkerId::from("wkr-1");

    //* When
    let claimed = store.claim_oldest_waiting(&w).await.unwrap().unwrap();
    let next = store.claim_oldest_waiting(&w).await.unwrap();

    //* Then
    assert_eq!(claimed.id, "fine");
    assert_eq!(next, None);
    let (status, failure): (String, Option<Json<FailureReason>>) =
        sqlx::query_as("SELECT status, failure FROM jobs WHERE id = 'broken'")
            .fetch_one(&**store.pool())
            .await
            .unwrap();
    assert_eq!(status, "failed");
    let failure = failure.map(|f| f.0);
    assert!(
        matches!(&failure, Some(FailureReason::Rejected { message }) if message.contains("unknown constellation")),
        "{failure:?}"
    );
}

#[tokio::test]
async fn non_owner_finalize_is_rejected() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 1)).await.unwrap();
    let owner = WorkerId::from("wkr-1");
    let other = WorkerId::from("wkr-2");
    let id = JobId::from("a");
    store.claim_oldest_waiting(&owner).await.unwrap().unwrap();

    //* When
    let err = store.finalize(&id, &other, &Resolution::Complete).await.unwrap_err();

    //* Then
    assert!(err.is_ownership_lost(), "unexpected error: {err}");
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.owner, Some(owner.clone()));

    let missing = store.finalize(&JobId::from("nope"), &owner, &Resolution::Complete).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn results_and_failure_are_persisted() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 2)).await.unwrap();
    let w = WorkerId::from("wkr-1");
    let id = JobId::from("a");
    store.claim_oldest_waiting(&w).await.unwrap().unwrap();

    //* When
    let outcome = SnapshotOutcome::Estimate(estimate(1));
    store.write_result(&id, 1, &outcome).await.unwrap();
    store.write_result(&id, 1, &outcome).await.unwrap();
    let out_of_range = store.write_result(&id, 5, &outcome).await;
    store.finalize(&id, &w, &Resolution::Failed(FailureReason::NoEstimates)).await.unwrap();

    //* Then
    assert!(matches!(out_of_range, Err(StoreError::SnapshotOutOfRange { index: 5, .. })));
    let job = store.get(&id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure, Some(FailureReason::NoEstimates));
    assert_eq!(job.results.get(&1), Some(&outcome));
    assert_eq!(job.pending_snapshots(), vec![0]);

    let late = store.write_result(&id, 0, &outcome).await;
    assert!(matches!(late, Err(StoreError::NotProcessing { status: JobStatus::Failed, .. })));
    let twice = store.finalize(&id, &w, &Resolution::Complete).await;
    assert!(matches!(twice, Err(StoreError::InvalidTransition { .. })));
}

#[tokio::test]
async fn stale_jobs_are_requeued() {
    //* Given
    let store = temp_store().await;
    store.enqueue(new_job("a", epoch(), 1)).await.unwrap();
    let w = WorkerId::from("wkr-1");
    store.claim_oldest_waiting(&w).await.unwrap().unwrap();

    //* When
    let fresh = store.requeue_stale(Duration::from_secs(3600)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stale = store.requeue_stale(Duration::from_millis(10)).await.unwrap();

    //* Then
    assert!(fresh.is_empty());
    assert_eq!(stale, vec![JobId::from("a")]);
    let err = store.heartbeat(&JobId::from("a"), &w).await.unwrap_err();
    assert!(err.is_ownership_lost());
}
