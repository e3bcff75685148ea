// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and lifecycle state machine.
//!
//! ```text
//! waiting ──claim──▶ processing ──finalize──▶ complete
//!    ▲                   │    └────finalize──▶ failed
//!    └─────release───────┘
//! ```
//!
//! Every transition out of `processing` is only valid for the worker recorded
//! as the job's owner.

use crate::navigation::{last_needed_date, NavigationRequirement};
use crate::snapshot::{PositioningErrorKind, Snapshot, SnapshotOutcome};
use crate::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a job (one user upload).
    ///
    /// Upload ids are assigned by the upload handler and wrapped verbatim;
    /// `generate()` is only used for jobs enqueued locally.
    pub struct JobId("job-");
}

/// Status of a job in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Uploaded, not held by any worker
    Waiting,
    /// Claimed by exactly one worker
    Processing,
    /// Terminal: every snapshot has a result
    Complete,
    /// Terminal: the job could not be positioned
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Waiting, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Waiting)
                | (JobStatus::Processing, JobStatus::Complete)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string read from the store that is not one of [`JobStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("waiting") => Ok(JobStatus::Waiting),
            s if s.eq_ignore_ascii_case("processing") => Ok(JobStatus::Processing),
            s if s.eq_ignore_ascii_case("complete") => Ok(JobStatus::Complete),
            s if s.eq_ignore_ascii_case("failed") => Ok(JobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Why a job ended in [`JobStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// Navigation data never arrived within the deferral bound
    NavigationDataUnavailable { deferrals: u32 },
    /// A snapshot failed in a way that invalidates the whole job
    Positioning { snapshot: usize, kind: PositioningErrorKind },
    /// No snapshot produced an estimate
    NoEstimates,
    /// The job cannot be positioned at all (e.g. it has no snapshots)
    Rejected { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NavigationDataUnavailable { deferrals } => {
                write!(f, "navigation data unavailable after {} deferrals", deferrals)
            }
            FailureReason::Positioning { snapshot, kind } => {
                write!(f, "snapshot {} failed: {}", snapshot, kind)
            }
            FailureReason::NoEstimates => f.write_str("no snapshot produced a position"),
            FailureReason::Rejected { message } => write!(f, "rejected: {}", message),
        }
    }
}

/// Terminal decision passed to `finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Complete,
    Failed(FailureReason),
}

impl Resolution {
    pub fn status(&self) -> JobStatus {
        match self {
            Resolution::Complete => JobStatus::Complete,
            Resolution::Failed(_) => JobStatus::Failed,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Resolution::Complete => None,
            Resolution::Failed(reason) => Some(reason),
        }
    }
}

/// Where to tell the user that their job finished. Every channel is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTargets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Serialized web-push subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<String>,
    /// Interactive chat id, registered through the chat responder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl NotifyTargets {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.push.is_none() && self.chat_id.is_none()
    }
}

/// Known starting position of a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// User-supplied priors passed through to the positioning engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferencePoint>,
    /// Maximum receiver velocity in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_velocity: Option<f64>,
    /// When the receiver was deployed; earlier snapshots are not positioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
    /// When the receiver was recovered; later snapshots are not positioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl JobHints {
    /// Whether a snapshot captured `at` falls inside the deployment window.
    /// Both bounds are inclusive and either may be open.
    pub fn in_deployment(&self, at: DateTime<Utc>) -> bool {
        self.deployed_at.map_or(true, |start| start <= at)
            && self.recovered_at.map_or(true, |end| at <= end)
    }
}

/// Input for enqueueing a job. The store assigns `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub id: JobId,
    pub snapshots: Vec<Snapshot>,
    pub notify_targets: NotifyTargets,
    pub hints: JobHints,
    /// Earliest time the job may be processed, for uploads that asked for
    /// final rather than rapid navigation products
    pub not_before: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(id: impl Into<JobId>, snapshots: Vec<Snapshot>) -> Self {
        Self {
            id: id.into(),
            snapshots,
            notify_targets: NotifyTargets::default(),
            hints: JobHints::default(),
            not_before: None,
        }
    }

    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    pub fn with_notify_targets(mut self, targets: NotifyTargets) -> Self {
        self.notify_targets = targets;
        self
    }

    pub fn with_hints(mut self, hints: JobHints) -> Self {
        self.hints = hints;
        self
    }
}

/// One user upload awaiting (or done with) positioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Insertion time; defines claim order and never changes
    pub created_at: DateTime<Utc>,
    /// Worker that holds (or last held) the job
    pub owner: Option<WorkerId>,
    /// Number of times the job was released for missing navigation data
    pub deferrals: u32,
    /// A released job is not claimable before this time
    pub retry_at: Option<DateTime<Utc>>,
    /// The job is not claimable until after this time
    pub not_before: Option<DateTime<Utc>>,
    /// Last liveness signal from the owner while processing
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub snapshots: Vec<Snapshot>,
    /// Snapshot index → outcome, filled in as the batch progresses
    pub results: BTreeMap<usize, SnapshotOutcome>,
    pub notify_targets: NotifyTargets,
    pub hints: JobHints,
    pub failure: Option<FailureReason>,
}

impl Job {
    /// A freshly enqueued, waiting job.
    pub fn from_new(new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            status: JobStatus::Waiting,
            created_at,
            owner: None,
            deferrals: 0,
            retry_at: None,
            not_before: new.not_before,
            heartbeat_at: None,
            snapshots: new.snapshots,
            results: BTreeMap::new(),
            notify_targets: new.notify_targets,
            hints: new.hints,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the job may be claimed at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Waiting
            && self.retry_at.map_or(true, |at| at <= now)
            && self.not_before.map_or(true, |at| at < now)
    }

    /// Whether snapshot `index` was captured inside the deployment window.
    pub fn in_deployment(&self, index: usize) -> bool {
        self.snapshots.get(index).is_some_and(|s| self.hints.in_deployment(s.captured_at))
    }

    /// Indices of snapshots that do not have a stored outcome yet.
    pub fn pending_snapshots(&self) -> Vec<usize> {
        (0..self.snapshots.len()).filter(|i| !self.results.contains_key(i)).collect()
    }

    /// Navigation data for the snapshots inside the deployment window, up to
    /// the last date a held-back job needs.
    pub fn navigation_requirement(&self) -> NavigationRequirement {
        let deployed: Vec<Snapshot> = self
            .snapshots
            .iter()
            .filter(|s| self.hints.in_deployment(s.captured_at))
            .cloned()
            .collect();
        let req = NavigationRequirement::for_snapshots(&deployed);
        match self.not_before {
            Some(at) => req.through(last_needed_date(at)),
            None => req,
        }
    }

    /// Time since the job became eligible: its creation, or its
    /// `not_before` if that is later.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        let eligible = self.not_before.map_or(self.created_at, |at| at.max(self.created_at));
        now.signed_duration_since(eligible)
    }

    /// Validate that `worker` may move this job to `to`.
    pub fn check_transition(&self, worker: &WorkerId, to: JobStatus) -> Result<(), TransitionError> {
        check_owned_transition(&self.id, self.status, self.owner.as_ref(), worker, to)
    }
}

/// Rejected attempt to move a job out of `processing`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The caller is not the job's current owner: it was released, reaped,
    /// or claimed by someone else since the caller claimed it.
    #[error("ownership of job {job_id} lost")]
    OwnershipLost { job_id: JobId },

    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition { job_id: JobId, from: JobStatus, to: JobStatus },
}

/// Classify an owner-guarded transition from the job's current row.
///
/// Shared by every store implementation so that a conditional update which
/// matched no row is reported the same way everywhere:
/// - `to` is not reachable from `processing` → `InvalidTransition`
/// - `owner` is not `worker` → `OwnershipLost`
/// - owned, but no longer `processing` → `InvalidTransition`
pub fn check_owned_transition(
    job_id: &JobId,
    status: JobStatus,
    owner: Option<&WorkerId>,
    worker: &WorkerId,
    to: JobStatus,
) -> Result<(), TransitionError> {
    if !JobStatus::Processing.can_transition_to(to) {
        return Err(TransitionError::InvalidTransition { job_id: job_id.clone(), from: status, to });
    }
    if owner != Some(worker) {
        return Err(TransitionError::OwnershipLost { job_id: job_id.clone() });
    }
    if status != JobStatus::Processing {
        return Err(TransitionError::InvalidTransition { job_id: job_id.clone(), from: status, to });
    }
    Ok(())
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = "job-test",
        }
        set {
            status: JobStatus = JobStatus::Waiting,
            created_at: DateTime<Utc> = crate::test_support::epoch(),
            deferrals: u32 = 0,
            snapshots: Vec<Snapshot> = Vec::new(),
            results: BTreeMap<usize, SnapshotOutcome> = BTreeMap::new(),
            notify_targets: NotifyTargets = NotifyTargets::default(),
            hints: JobHints = JobHints::default(),
        }
        option {
            owner: WorkerId = None,
            retry_at: DateTime<Utc> = None,
            not_before: DateTime<Utc> = None,
            heartbeat_at: DateTime<Utc> = None,
            failure: FailureReason = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
