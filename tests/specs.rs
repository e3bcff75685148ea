// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level behavioral specs
//!
//! Each module drives the real store contract, worker, and dispatcher
//! against in-memory fakes; `cli` runs the built `sqd` binary.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli.rs"]
mod cli;
#[path = "specs/store.rs"]
mod store;
#[path = "specs/worker.rs"]
mod worker;
