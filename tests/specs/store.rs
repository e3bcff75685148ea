// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job store contract specs
//!
//! Claims are exclusive, releases keep queue order, and only the owner may
//! finalize.

use crate::prelude::*;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_concurrent_claim_wins() {
    for round in 0..20 {
        let world = World::new();
        let id = world.enqueue(new_job(&format!("job-{round}"), epoch(), 1)).await;

        let mut claims = JoinSet::new();
        for n in 0..8 {
            let store = world.store.clone();
            claims.spawn(async move {
                store.claim_oldest_waiting(&WorkerId::from(format!("wkr-{n}"))).await
            });
        }
        let mut winners = Vec::new();
        while let Some(claim) = claims.join_next().await {
            if let Some(job) = claim.unwrap().unwrap() {
                winners.push(job);
            }
        }

        assert_eq!(winners.len(), 1, "round {round}");
        let stored = world.job(&id).await;
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.owner, winners[0].owner);
    }
}

#[tokio::test]
async fn released_job_keeps_its_place_in_the_queue() {
    let world = World::new();
    let first = world.enqueue(new_job("job-first", epoch(), 1)).await;
    world.clock.advance(Duration::from_secs(60));
    let second = world.enqueue(new_job("job-second", epoch(), 1)).await;
    let worker = WorkerId::from("wkr-a");

    let claimed = world.store.claim_oldest_waiting(&worker).await.unwrap().unwrap();
    assert_eq!(claimed.id, first);
    let deferrals = world.store.release(&first, &worker, Duration::ZERO).await.unwrap();

    assert_eq!(deferrals, 1);
    let released = world.job(&first).await;
    assert_eq!(released.status, JobStatus::Waiting);
    assert_eq!(released.owner, None);
    assert_eq!(released.created_at, epoch());

    let next = world.store.claim_oldest_waiting(&worker).await.unwrap().unwrap();
    assert_eq!(next.id, first, "released job must still precede {second}");
}

#[tokio::test]
async fn backoff_lets_younger_jobs_go_first() {
    let world = World::new();
    let first = world.enqueue(new_job("job-first", epoch(), 1)).await;
    world.clock.advance(Duration::from_secs(1));
    let second = world.enqueue(new_job("job-second", epoch(), 1)).await;
    let worker = WorkerId::from("wkr-a");

    world.store.claim_oldest_waiting(&worker).await.unwrap();
    world.store.release(&first, &worker, Duration::from_secs(5)).await.unwrap();

    let next = world.store.claim_oldest_waiting(&worker).await.unwrap().unwrap();
    assert_eq!(next.id, second);

    world.clock.advance(Duration::from_secs(5));
    let after_backoff = world.store.claim_oldest_waiting(&worker).await.unwrap().unwrap();
    assert_eq!(after_backoff.id, first);
}

#[tokio::test]
async fn only_the_owner_may_finalize() {
    let world = World::new();
    let id = world.enqueue(new_job("job-1", epoch(), 1)).await;
    let owner = WorkerId::from("wkr-owner");
    world.store.claim_oldest_waiting(&owner).await.unwrap();

    for resolution in [
        Resolution::Complete,
        Resolution::Failed(FailureReason::NoEstimates),
    ] {
        let err = world
            .store
            .finalize(&id, &WorkerId::from("wkr-other"), &resolution)
            .await
            .unwrap_err();
        assert!(err.is_ownership_lost(), "{err}");
        let job = world.job(&id).await;
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.owner, Some(owner.clone()));
    }

    world.store.finalize(&id, &owner, &Resolution::Complete).await.unwrap();
    assert_eq!(world.job(&id).await.status, JobStatus::Complete);

    let err = world.store.finalize(&id, &owner, &Resolution::Complete).await.unwrap_err();
    assert!(matches!(err, StoreError::OwnershipLost { .. } | StoreError::InvalidTransition { .. }));
    assert_eq!(world.job(&id).await.status, JobStatus::Complete);
}
