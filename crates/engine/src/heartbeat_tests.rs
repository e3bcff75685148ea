// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sq_core::test_support::{epoch, new_job};
use sq_core::FakeClock;
use sq_storage::MemoryJobStore;

async fn claimed(store: &MemoryJobStore<FakeClock>, worker: &WorkerId) -> JobId {
    store.enqueue(new_job("job-hb", epoch(), 1)).await.unwrap();
    store.claim_oldest_waiting(worker).await.unwrap().unwrap().id
}

#[tokio::test(start_paused = true)]
async fn beats_while_the_guard_lives() {
    let clock = FakeClock::new();
    let store = MemoryJobStore::with_clock(clock.clone());
    let worker = WorkerId::from("wkr-a");
    let id = claimed(&store, &worker).await;
    let claimed_at = store.get(&id).await.unwrap().unwrap().heartbeat_at.unwrap();

    let guard = spawn(store.clone(), id.clone(), worker, Duration::from_secs(30), CancellationToken::new());
    clock.advance(Duration::from_secs(31));
    tokio::time::sleep(Duration::from_secs(31)).await;

    let beat = store.get(&id).await.unwrap().unwrap().heartbeat_at.unwrap();
    assert!(beat > claimed_at);

    drop(guard);
    clock.advance(Duration::from_secs(120));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().heartbeat_at, Some(beat));
}

#[tokio::test(start_paused = true)]
async fn lost_ownership_cancels_the_token() {
    let store = MemoryJobStore::with_clock(FakeClock::new());
    let worker = WorkerId::from("wkr-a");
    let id = claimed(&store, &worker).await;
    let lost = CancellationToken::new();

    let _guard = spawn(store.clone(), id.clone(), worker.clone(), Duration::from_secs(30), lost.clone());
    store.release(&id, &worker, Duration::from_secs(5)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert!(lost.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn outage_does_not_abandon_the_job() {
    let store = MemoryJobStore::with_clock(FakeClock::new());
    let worker = WorkerId::from("wkr-a");
    let id = claimed(&store, &worker).await;
    let lost = CancellationToken::new();

    let _guard = spawn(store.clone(), id, worker, Duration::from_secs(30), lost.clone());
    store.set_unavailable(true);
    tokio::time::sleep(Duration::from_secs(95)).await;

    assert!(!lost.is_cancelled());
}
