// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker specs
//!
//! Deferral while navigation data is missing, partial positioning results,
//! and several workers sharing one queue.

use crate::prelude::*;
use std::collections::BTreeSet;

const TICK: Duration = Duration::from_secs(5);

#[tokio::test]
async fn job_waits_for_navigation_data_then_completes() {
    let world = World::new();
    let t0 = world.clock.utc_now();
    let id = world.enqueue(with_email(new_job("job-1", epoch(), 4))).await;
    let worker = world.worker("wkr-a", WorkerConfig::default().poll_interval(TICK).max_batch_size(10usize));
    let published_at = t0 + chrono::Duration::minutes(20);

    let mut deferrals = 0;
    let finished = loop {
        if world.clock.utc_now() >= published_at {
            world.publish_navigation();
        }
        match worker.tick().await.unwrap() {
            TickOutcome::Idle { deferred } => {
                deferrals += deferred.len();
                assert!(world.engine.calls().is_empty());
                assert!(world.email.sent().is_empty());
            }
            TickOutcome::Finished { job_id, status, .. } => break (job_id, status),
            other => panic!("unexpected tick outcome {:?}", other),
        }
        world.clock.advance(TICK);
    };

    assert_eq!(finished, (id.clone(), JobStatus::Complete));
    assert_eq!(world.clock.utc_now(), published_at, "proceeds on the first poll after publication");
    assert_eq!(deferrals, 20 * 60 / 5);

    let job = world.job(&id).await;
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.results.len(), 4);
    assert!(job.results.values().all(|outcome| outcome.estimate().is_some()));
    assert_eq!(job.deferrals as usize, deferrals);
    assert_eq!(job.created_at, t0);

    let calls = world.engine.calls();
    assert_eq!(calls.len(), 4);
    let positioned: BTreeSet<_> = calls.iter().map(|c| c.captured_at).collect();
    assert_eq!(positioned.len(), 4, "each snapshot positioned exactly once");

    let sent = world.email.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ada@example.com");
    assert_eq!(sent[0].notice.job_id, id);
    assert!(sent[0].notice.body.contains("/view?uploadid=job-1"));
}

#[tokio::test]
async fn deferral_limit_fails_the_job() {
    let world = World::new();
    let id = world.enqueue(with_email(new_job("job-1", epoch(), 2))).await;
    let worker = world.worker("wkr-a", WorkerConfig::default().max_deferrals(3u32));

    let mut ticks = 0;
    let status = loop {
        ticks += 1;
        assert!(ticks <= 10, "job never left the queue");
        if let TickOutcome::Finished { status, .. } = worker.tick().await.unwrap() {
            break status;
        }
        world.clock.advance(TICK);
    };

    assert_eq!(status, JobStatus::Failed);
    let job = world.job(&id).await;
    assert_eq!(job.failure, Some(FailureReason::NavigationDataUnavailable { deferrals: 3 }));
    assert!(job.results.is_empty());
    assert!(world.engine.calls().is_empty());
    assert_eq!(world.email.sent().len(), 1);
}

async fn three_snapshots_one_failing(policy: ResultPolicy) -> Job {
    let world = World::new();
    world.publish_navigation();
    let job = new_job("job-1", epoch(), 3);
    let failing_at = job.snapshots[1].captured_at;
    world.engine.fail_at(
        failing_at,
        PositioningError::new(PositioningErrorKind::InsufficientSatellites, "4 satellites"),
    );
    let id = world.enqueue(job).await;

    let worker = world.worker("wkr-a", WorkerConfig::default().result_policy(policy));
    assert!(matches!(worker.tick().await.unwrap(), TickOutcome::Finished { .. }));
    world.job(&id).await
}

#[tokio::test]
async fn partial_results_resolve_by_policy() {
    for (policy, expected) in [
        (ResultPolicy::Lenient, JobStatus::Complete),
        (ResultPolicy::Strict, JobStatus::Failed),
    ] {
        let first = three_snapshots_one_failing(policy).await;
        let again = three_snapshots_one_failing(policy).await;

        assert_eq!(first.status, expected, "{policy:?}");
        assert_eq!(again.status, first.status, "{policy:?} is deterministic");
        assert_eq!(again.failure, first.failure);

        assert_eq!(first.results.len(), 3);
        assert!(first.results[&0].estimate().is_some());
        assert_eq!(
            first.results[&1].error().map(|e| e.kind),
            Some(PositioningErrorKind::InsufficientSatellites)
        );
        assert!(first.results[&2].estimate().is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_workers_split_the_queue() {
    let world = World::new();
    world.publish_navigation();
    let mut ids = BTreeSet::new();
    for n in 0..10 {
        ids.insert(world.enqueue(new_job(&format!("job-{n:02}"), epoch(), 2)).await);
        world.clock.advance(Duration::from_secs(1));
    }
    world.engine.set_delay(Duration::from_millis(5));
    let a = world.worker("wkr-a", WorkerConfig::default());
    let b = world.worker("wkr-b", WorkerConfig::default());

    let (done_a, done_b) = tokio::join!(drain(&a), drain(&b));

    let set_a: BTreeSet<_> = done_a.iter().cloned().collect();
    let set_b: BTreeSet<_> = done_b.iter().cloned().collect();
    assert_eq!(set_a.len(), done_a.len());
    assert_eq!(set_b.len(), done_b.len());
    assert!(set_a.is_disjoint(&set_b), "a job was finished by both workers");
    assert_eq!(set_a.union(&set_b).cloned().collect::<BTreeSet<_>>(), ids);

    for id in &ids {
        let job = world.job(id).await;
        assert_eq!(job.status, JobStatus::Complete);
        let owner = job.owner.as_ref().map(|w| w.as_str());
        let expected = if set_a.contains(id) { "wkr-a" } else { "wkr-b" };
        assert_eq!(owner, Some(expected));
    }
    assert_eq!(world.engine.calls().len(), 20);
}
