// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-engine: the positioning worker
//!
//! Claims jobs from the shared store, gates them on navigation data, runs
//! their snapshots through the positioning engine in bounded batches,
//! finalizes them and notifies users.

pub mod config;
pub mod dispatcher;
mod error;
pub mod heartbeat;
pub mod policy;
pub mod reaper;
pub mod responder;
mod retry;
pub mod scheduler;
pub mod worker;

pub use config::{ConfigError, ResultPolicy, WorkerConfig};
pub use dispatcher::{Delivery, NotificationDispatcher};
pub use error::RuntimeError;
pub use reaper::Reaper;
pub use responder::Responder;
pub use scheduler::{BatchOutcome, BatchScheduler};
pub use worker::{TickOutcome, Worker};
