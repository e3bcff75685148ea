// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration
//!
//! Every setting resolves as: command-line flag, then `SQ_*` environment
//! variable, then the TOML file given with `--config`, then the default.

use crate::env::EnvOverrides;
use clap::Parser;
use serde::Deserialize;
use sq_adapters::positioning::DEFAULT_ENGINE_TIMEOUT;
use sq_engine::{ResultPolicy, WorkerConfig};
use sq_storage::DEFAULT_POOL_SIZE;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_NAVIGATION_DIR: &str = "navigation_data";
pub const DEFAULT_WEBSITE_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("{0} is required (flag, environment, or config file)")]
    Missing(&'static str),

    #[error(
        "reap_after ({reap_after:?}) must be at least twice the heartbeat interval ({heartbeat:?})"
    )]
    ReapBeforeHeartbeat { reap_after: Duration, heartbeat: Duration },

    #[error(transparent)]
    Worker(#[from] sq_engine::ConfigError),
}

/// Command-line flags of `sqd`.
#[derive(Parser, Debug, Default)]
#[command(name = "sqd", version, about = "GNSS snapshot positioning worker")]
pub struct Args {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Postgres connection string of the shared job store
    #[arg(long)]
    pub database_url: Option<String>,

    /// Connections kept open to the job store
    #[arg(long)]
    pub pool_size: Option<u32>,

    /// Wait between claim attempts when the queue is empty
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Snapshots positioned in parallel by this worker
    #[arg(short = 'b', long)]
    pub max_batch_size: Option<usize>,

    /// Do not run the interactive chat bot (another worker owns it)
    #[arg(short = 'n', long)]
    pub no_interactive: bool,

    /// Fail a job after this many deferrals for missing navigation data
    #[arg(long)]
    pub max_deferrals: Option<u32>,

    /// Fail a job still missing navigation data this long after upload (0 = never)
    #[arg(long)]
    pub max_wait_hours: Option<u64>,

    /// Requeue processing jobs whose owner has been silent this long
    #[arg(long)]
    pub reap_after_secs: Option<u64>,

    /// Directory holding the published navigation data files
    #[arg(long)]
    pub navigation_dir: Option<PathBuf>,

    /// Executable that positions one snapshot
    #[arg(long)]
    pub engine_command: Option<String>,

    /// Fail the job on any per-snapshot error
    #[arg(long)]
    pub strict: bool,

    /// Write daily rolling logs here instead of stderr
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

/// Contents of the `--config` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database_url: Option<String>,
    pub pool_size: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub max_batch_size: Option<usize>,
    pub interactive: Option<bool>,
    pub max_deferrals: Option<u32>,
    pub max_wait_hours: Option<u64>,
    pub reap_after_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub navigation_dir: Option<PathBuf>,
    pub engine_command: Option<String>,
    pub engine_args: Vec<String>,
    pub engine_timeout_secs: Option<u64>,
    pub result_policy: Option<ResultPolicy>,
    pub log_dir: Option<PathBuf>,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    /// Base URL of the website linked in completion messages
    pub website_url: Option<String>,
    /// Relay that delivers email notices (JSON POST)
    pub email_relay_url: Option<String>,
    /// Relay that delivers web-push notices (JSON POST)
    pub push_relay_url: Option<String>,
    /// Telegram bot token for the interactive chat channel
    pub telegram_token: Option<String>,
    /// Telegram bot token for operator error reports; defaults to `telegram_token`
    pub operator_bot_token: Option<String>,
    /// Chat that receives operator error reports
    pub operator_chat_id: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub pool_size: u32,
    pub worker: WorkerConfig,
    pub reap_after: Option<Duration>,
    pub navigation_dir: PathBuf,
    pub engine_command: String,
    pub engine_args: Vec<String>,
    pub engine_timeout: Duration,
    pub log_dir: Option<PathBuf>,
    pub website_url: String,
    pub notify: NotifyConfig,
}

impl Settings {
    /// Load the config file named by `args` (if any) and the environment,
    /// then resolve.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, crate::env::overrides()?, file)
    }

    pub fn resolve(args: &Args, env: EnvOverrides, file: FileConfig) -> Result<Self, ConfigError> {
        let database_url = args
            .database_url
            .clone()
            .or(env.database_url)
            .or(file.database_url)
            .ok_or(ConfigError::Missing("database_url"))?;
        let engine_command = args
            .engine_command
            .clone()
            .or(env.engine_command)
            .or(file.engine_command)
            .ok_or(ConfigError::Missing("engine_command"))?;

        let poll_interval = Duration::from_millis(
            args.poll_interval_ms
                .or(env.poll_interval_ms)
                .or(file.poll_interval_ms)
                .unwrap_or(sq_engine::config::DEFAULT_POLL_INTERVAL.as_millis() as u64),
        );
        let interactive = !(args.no_interactive || env.no_interactive)
            && file.interactive.unwrap_or(true);
        let result_policy = if args.strict {
            ResultPolicy::Strict
        } else {
            file.result_policy.unwrap_or_default()
        };

        let mut worker = WorkerConfig::default()
            .poll_interval(poll_interval)
            .deferral_backoff(poll_interval)
            .max_batch_size(
                args.max_batch_size
                    .or(env.max_batch_size)
                    .or(file.max_batch_size)
                    .unwrap_or(sq_engine::config::DEFAULT_MAX_BATCH_SIZE),
            )
            .interactive(interactive)
            .result_policy(result_policy);
        if let Some(max) = args.max_deferrals.or(file.max_deferrals) {
            worker = worker.max_deferrals(max);
        }
        match args.max_wait_hours.or(file.max_wait_hours) {
            Some(0) => worker = worker.without_max_wait(),
            Some(hours) => worker = worker.max_wait(Duration::from_secs(hours * 3600)),
            None => {}
        }
        if let Some(secs) = file.heartbeat_interval_secs {
            worker = worker.heartbeat_interval(Duration::from_secs(secs));
        }
        worker.validate()?;

        let reap_after = args
            .reap_after_secs
            .or(file.reap_after_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        // A live owner must get at least two beats in before it can be reaped.
        if let Some(reap_after) = reap_after {
            let heartbeat = worker.heartbeat_interval;
            if reap_after < heartbeat * 2 {
                return Err(ConfigError::ReapBeforeHeartbeat { reap_after, heartbeat });
            }
        }

        let mut notify = file.notify;
        if let Some(token) = env.telegram_token {
            notify.telegram_token = Some(token);
        }

        Ok(Self {
            database_url,
            pool_size: args.pool_size.or(env.pool_size).or(file.pool_size).unwrap_or(DEFAULT_POOL_SIZE),
            worker,
            reap_after,
            navigation_dir: args
                .navigation_dir
                .clone()
                .or(env.navigation_dir)
                .or(file.navigation_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NAVIGATION_DIR)),
            engine_command,
            engine_args: file.engine_args,
            engine_timeout: file
                .engine_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ENGINE_TIMEOUT),
            log_dir: args.log_dir.clone().or(env.log_dir).or(file.log_dir),
            website_url: notify
                .website_url
                .clone()
                .unwrap_or_else(|| DEFAULT_WEBSITE_URL.to_string()),
            notify,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
