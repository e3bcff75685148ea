// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(72 * 60 * 60);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_RETRIES: usize = 5;

/// How per-snapshot failures decide the job's terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultPolicy {
    /// Complete with partial results unless a snapshot failed fatally or no
    /// snapshot produced an estimate
    #[default]
    Lenient,
    /// Any per-snapshot failure fails the job
    Strict,
}

sq_core::simple_display! {
    ResultPolicy {
        Lenient => "lenient",
        Strict => "strict",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max batch size must be at least 1")]
    ZeroBatchSize,
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
    #[error("deferral backoff must be non-zero")]
    ZeroDeferralBackoff,
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeatInterval,
}

/// Per-process worker settings. Nothing here is shared between workers.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Time between claim attempts when the previous tick found nothing
    pub poll_interval: Duration,
    /// Bound on snapshots positioned concurrently by this process
    pub max_batch_size: usize,
    /// Whether this process owns the interactive chat channel
    pub interactive: bool,
    /// How long a job released for missing navigation data stays unclaimable
    pub deferral_backoff: Duration,
    pub max_deferrals: Option<u32>,
    /// Fail a job still missing navigation data this long after upload
    pub max_wait: Option<Duration>,
    pub heartbeat_interval: Duration,
    pub result_policy: ResultPolicy,
    /// Attempts at writing one result while the store is unreachable
    pub write_retries: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            interactive: true,
            deferral_backoff: DEFAULT_POLL_INTERVAL,
            max_deferrals: None,
            max_wait: Some(DEFAULT_MAX_WAIT),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            result_policy: ResultPolicy::Lenient,
            write_retries: DEFAULT_WRITE_RETRIES,
        }
    }
}

impl WorkerConfig {
    sq_core::setters! {
        set {
            poll_interval: Duration,
            max_batch_size: usize,
            interactive: bool,
            deferral_backoff: Duration,
            heartbeat_interval: Duration,
            result_policy: ResultPolicy,
            write_retries: usize,
        }
        option {
            max_deferrals: u32,
            max_wait: Duration,
        }
    }

    /// Disable the age-based starvation bound.
    pub fn without_max_wait(mut self) -> Self {
        self.max_wait = None;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.deferral_backoff.is_zero() {
            return Err(ConfigError::ZeroDeferralBackoff);
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
