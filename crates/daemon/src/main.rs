// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sqd: snapshot positioning worker daemon
//!
//! Claims uploads from the shared job store, positions their snapshots once
//! navigation data is published, and notifies the uploader.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod env;
mod lifecycle;
mod logging;

use anyhow::Context;
use clap::Parser;
use config::{Args, Settings};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args).context("loading configuration")?;
    let _log_guard = logging::init(settings.log_dir.as_deref())?;

    let shutdown = CancellationToken::new();
    tokio::spawn(lifecycle::watch_signals(shutdown.clone()));

    lifecycle::serve(settings, shutdown).await
}
