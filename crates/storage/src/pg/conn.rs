// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres connection pool

use crate::error::StoreError;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::instrument;

/// How long a caller waits for a free connection before the store is
/// reported unavailable.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

static MIGRATOR: Migrator = sqlx::migrate!();

/// A connection pool to the job database.
#[derive(Debug, Clone)]
pub struct DbConnPool(Pool<Postgres>);

impl DbConnPool {
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        Ok(Self(pool))
    }

    /// Apply pending migrations. sqlx locks the database while migrating and
    /// never applies the same migration twice, so every worker may call this
    /// on startup.
    #[instrument(skip(self), err)]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.0).await?;
        Ok(())
    }
}

impl std::ops::Deref for DbConnPool {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
