// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sq_core::test_support::{epoch, new_job};
use sq_core::{FakeClock, JobStatus, SnapshotOutcome, WorkerId};
use sq_storage::MemoryJobStore;

#[yare::parameterized(
    short = { Duration::from_secs(2),   Duration::from_secs(1) },
    long  = { Duration::from_secs(600), Duration::from_secs(150) },
)]
fn interval_is_a_quarter_of_the_threshold(stale_after: Duration, expected: Duration) {
    assert_eq!(Reaper::<MemoryJobStore>::default_interval(stale_after), expected);
}

#[tokio::test]
async fn sweep_requeues_silent_jobs_and_keeps_results() {
    let clock = FakeClock::new();
    let store = MemoryJobStore::with_clock(clock.clone());
    store.enqueue(new_job("job-dead", epoch(), 2)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    store.enqueue(new_job("job-alive", epoch(), 1)).await.unwrap();
    let dead = store.claim_oldest_waiting(&WorkerId::from("wkr-dead")).await.unwrap().unwrap();
    let outcome = SnapshotOutcome::Estimate(sq_core::test_support::estimate(0));
    store.write_result(&dead.id, 0, &outcome).await.unwrap();

    clock.advance(Duration::from_secs(120));
    let alive = store.claim_oldest_waiting(&WorkerId::from("wkr-alive")).await.unwrap().unwrap();

    let reaper = Reaper::new(store.clone(), Duration::from_secs(60), Duration::from_secs(15));
    assert_eq!(reaper.sweep().await.unwrap(), vec![dead.id.clone()]);

    let dead = store.get(&dead.id).await.unwrap().unwrap();
    assert_eq!(dead.status, JobStatus::Waiting);
    assert_eq!(dead.owner, None);
    assert_eq!(dead.results.get(&0), Some(&outcome));
    assert_eq!(store.get(&alive.id).await.unwrap().unwrap().status, JobStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn run_survives_an_outage_and_stops_on_shutdown() {
    let store = MemoryJobStore::with_clock(FakeClock::new());
    store.set_unavailable(true);
    let reaper = Reaper::new(store.clone(), Duration::from_secs(60), Duration::from_secs(15));
    let shutdown = CancellationToken::new();

    let running = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reaper.run(shutdown).await })
    };
    tokio::time::sleep(Duration::from_secs(40)).await;
    shutdown.cancel();

    running.await.unwrap();
}
