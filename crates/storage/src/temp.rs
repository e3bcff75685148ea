// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Throwaway Postgres server for integration tests.

use crate::pg::PgJobStore;
use pgtemp::{PgTempDB, PgTempDBBuilder};

/// A [`PgJobStore`] on a private database that is deleted on drop.
pub struct TempJobStore {
    store: PgJobStore,
    url: String,
    _db: PgTempDB,
}

impl TempJobStore {
    pub async fn new(pool_size: u32) -> Result<Self, crate::StoreError> {
        let db = PgTempDB::from_builder(PgTempDBBuilder::new());
        let url = db.connection_uri();
        tracing::info!(data_dir = %db.data_dir().display(), "started temp job database");
        let store = PgJobStore::connect_with_retry(&url, pool_size, 20).await?;
        Ok(Self { store, url, _db: db })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A second, independent pool on the same database, as another worker
    /// process would have.
    pub async fn connect_another(&self, pool_size: u32) -> Result<PgJobStore, crate::StoreError> {
        PgJobStore::connect(&self.url, pool_size).await
    }
}

impl std::ops::Deref for TempJobStore {
    type Target = PgJobStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
