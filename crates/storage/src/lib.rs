// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-storage: the shared job store
//!
//! Workers coordinate only through this store. [`PgJobStore`] is the
//! production backend; [`MemoryJobStore`] gives tests the same contract
//! without a database.

mod error;
mod store;

pub mod pg;

#[cfg(any(test, feature = "test-support"))]
mod memory;

#[cfg(feature = "temp-db")]
pub mod temp;

pub use error::StoreError;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryJobStore;
pub use pg::{PgJobStore, DEFAULT_POOL_SIZE};
pub use store::JobStore;
