// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job store errors

use sq_core::{JobId, JobStatus, TransitionError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller no longer owns the job. Drop the operation; do not retry.
    #[error("ownership of job {job_id} lost")]
    OwnershipLost { job_id: JobId },

    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition { job_id: JobId, from: JobStatus, to: JobStatus },

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} already exists")]
    Duplicate(JobId),

    #[error("job {job_id} is {status}, results can only be written while processing")]
    NotProcessing { job_id: JobId, status: JobStatus },

    #[error("job {job_id} has no snapshot {index}")]
    SnapshotOutOfRange { job_id: JobId, index: usize },

    /// Transient connectivity failure; the caller may retry later.
    #[error("store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row for job {job_id}: {message}")]
    Corrupt { job_id: JobId, message: String },
}

impl StoreError {
    /// Returns `true` if the error is likely a transient connection issue.
    ///
    /// The following `sqlx` errors count as transient:
    /// - `Io`: network issue or closed socket
    /// - `Tls`: TLS handshake failure
    /// - `PoolTimedOut`: no free connection within the acquire timeout
    /// - `PoolClosed`: the pool was closed while an operation was pending
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    /// Whether the caller lost the job to someone else (or to the reaper).
    pub fn is_ownership_lost(&self) -> bool {
        matches!(self, StoreError::OwnershipLost { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Unavailable(err),
            other => StoreError::Database(other),
        }
    }
}

impl From<TransitionError> for StoreError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::OwnershipLost { job_id } => StoreError::OwnershipLost { job_id },
            TransitionError::InvalidTransition { job_id, from, to } => {
                StoreError::InvalidTransition { job_id, from, to }
            }
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
