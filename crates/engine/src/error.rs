// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker runtime errors

use crate::config::ConfigError;
use sq_storage::StoreError;
use thiserror::Error;

/// Errors that stop a worker task.
///
/// Transient store failures and lost ownership are handled inside a tick and
/// never surface here.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid worker config: {0}")]
    Config(#[from] ConfigError),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

impl RuntimeError {
    /// Whether retrying later may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Store(e) if e.is_transient())
    }
}
