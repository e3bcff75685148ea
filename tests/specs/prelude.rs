// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared setup for the specs: one store, one set of fakes, any number of
//! workers.

use std::sync::Arc;

pub use std::time::Duration;

pub use sq_adapters::{Channel, FakeChatChannel, FakeEngine, FakeNavigationIndex, FakeTransport};
pub use sq_core::test_support::{epoch, new_job};
pub use sq_core::{
    Clock, FailureReason, FakeClock, Job, JobId, JobStatus, NewJob, NotifyTargets,
    PositioningError, PositioningErrorKind, Resolution, WorkerId,
};
pub use sq_engine::{NotificationDispatcher, ResultPolicy, TickOutcome, Worker, WorkerConfig};
pub use sq_storage::{JobStore, MemoryJobStore, StoreError};

pub type Store = MemoryJobStore<FakeClock>;
pub type SpecWorker = Worker<Store, FakeNavigationIndex, FakeEngine, FakeClock>;

pub const WEBSITE: &str = "https://snapq.example";

pub struct World {
    pub clock: FakeClock,
    pub store: Store,
    pub navigation: FakeNavigationIndex,
    pub engine: FakeEngine,
    pub email: FakeTransport,
}

impl World {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        Self {
            store: MemoryJobStore::with_clock(clock.clone()),
            clock,
            navigation: FakeNavigationIndex::new(),
            engine: FakeEngine::new(),
            email: FakeTransport::new(Channel::Email),
        }
    }

    pub fn worker(&self, name: &str, config: WorkerConfig) -> SpecWorker {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(self.email.clone()),
            Arc::new(FakeTransport::new(Channel::Push)),
            Arc::new(FakeChatChannel::new()),
            WEBSITE,
            config.interactive,
        );
        Worker::with_clock(
            WorkerId::from(name),
            self.store.clone(),
            self.navigation.clone(),
            self.engine.clone(),
            dispatcher,
            config,
            self.clock.clone(),
        )
    }

    /// Make navigation data for the capture date of `epoch()` available.
    pub fn publish_navigation(&self) {
        self.navigation.publish_all(epoch().date_naive());
    }

    pub async fn enqueue(&self, job: NewJob) -> JobId {
        self.store.enqueue(job).await.unwrap().id
    }

    pub async fn job(&self, id: &JobId) -> Job {
        self.store.get(id).await.unwrap().unwrap()
    }
}

pub fn with_email(job: NewJob) -> NewJob {
    job.with_notify_targets(NotifyTargets {
        email: Some("ada@example.com".into()),
        ..Default::default()
    })
}

/// Tick `worker` until it reports `Idle`, collecting the finished jobs.
pub async fn drain(worker: &SpecWorker) -> Vec<JobId> {
    let mut finished = Vec::new();
    loop {
        match worker.tick().await.unwrap() {
            TickOutcome::Finished { job_id, .. } => finished.push(job_id),
            TickOutcome::Idle { .. } => return finished,
            other => panic!("unexpected tick outcome {:?}", other),
        }
    }
}
