// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::ConfigError;

/// Settings taken from `SQ_*` variables. Unset or empty variables are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub database_url: Option<String>,
    pub pool_size: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub max_batch_size: Option<usize>,
    pub no_interactive: bool,
    pub navigation_dir: Option<PathBuf>,
    pub engine_command: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub telegram_token: Option<String>,
}

/// Read every `SQ_*` override from the process environment.
pub fn overrides() -> Result<EnvOverrides, ConfigError> {
    Ok(EnvOverrides {
        database_url: string("SQ_DATABASE_URL"),
        pool_size: parsed("SQ_POOL_SIZE")?,
        poll_interval_ms: parsed("SQ_POLL_INTERVAL_MS")?,
        max_batch_size: parsed("SQ_MAX_BATCH_SIZE")?,
        no_interactive: flag("SQ_NO_INTERACTIVE")?,
        navigation_dir: string("SQ_NAVIGATION_DIR").map(PathBuf::from),
        engine_command: string("SQ_ENGINE_COMMAND"),
        log_dir: string("SQ_LOG_DIR").map(PathBuf::from),
        telegram_token: string("SQ_TELEGRAM_TOKEN"),
    })
}

fn string(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

fn parsed<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match string(var) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| ConfigError::Env { var, value }),
    }
}

/// `1`/`true`/`yes` enable, `0`/`false`/`no` (or unset) disable.
fn flag(var: &'static str) -> Result<bool, ConfigError> {
    match string(var).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(ConfigError::Env { var, value: other.to_string() }),
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
