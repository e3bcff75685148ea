// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation data gate
//!
//! Navigation data is published by an external maintenance process as one
//! file per (UTC date, constellation), named `YYYY_DDD_<C>.npy` where `DDD`
//! is the day of year and `<C>` the RINEX system code. Published files are
//! never retracted.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sq_core::{Constellation, NavigationRequirement};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from navigation data lookups
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("failed to read navigation data at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("navigation data missing for {date} {constellation}")]
    Missing { date: NaiveDate, constellation: Constellation },
}

/// Navigation files resolved for one job, keyed by (date, constellation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationData {
    pub files: BTreeMap<(NaiveDate, Constellation), PathBuf>,
}

impl NavigationData {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.values().map(PathBuf::as_path)
    }
}

/// Answers "is navigation data for these dates and constellations present?"
#[async_trait]
pub trait NavigationIndex: Clone + Send + Sync + 'static {
    /// Whether every (date, constellation) pair of `req` is published.
    async fn is_available(&self, req: &NavigationRequirement) -> Result<bool, NavigationError>;

    /// Resolve the data for every pair of `req`.
    ///
    /// Fails with [`NavigationError::Missing`] if any pair is unavailable.
    async fn locate(&self, req: &NavigationRequirement) -> Result<NavigationData, NavigationError>;
}

/// File name of the navigation data for one (date, constellation).
pub fn file_name(date: NaiveDate, constellation: Constellation) -> String {
    format!("{:04}_{:03}_{}.npy", date.year(), date.ordinal(), constellation.code())
}

/// Inverse of [`file_name`]; `None` for anything else in the directory.
pub fn parse_file_name(name: &str) -> Option<(NaiveDate, Constellation)> {
    let stem = name.strip_suffix(".npy")?;
    let mut parts = stem.split('_');
    let year: i32 = parts.next()?.parse().ok()?;
    let day = parts.next()?;
    if day.len() != 3 {
        return None;
    }
    let ordinal: u32 = day.parse().ok()?;
    let mut code = parts.next()?.chars();
    let constellation = Constellation::from_code(code.next()?)?;
    if code.next().is_some() || parts.next().is_some() {
        return None;
    }
    let date = NaiveDate::from_yo_opt(year, ordinal)?;
    Some((date, constellation))
}

/// Navigation index over a directory of published files.
#[derive(Debug, Clone)]
pub struct FsNavigationIndex {
    root: PathBuf,
}

impl FsNavigationIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, date: NaiveDate, constellation: Constellation) -> PathBuf {
        self.root.join(file_name(date, constellation))
    }

    async fn exists(&self, path: &Path) -> Result<bool, NavigationError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|source| NavigationError::Io { path: path.to_path_buf(), source })
    }

    /// Every (date, constellation) currently published, in order.
    pub async fn published(&self) -> Result<Vec<(NaiveDate, Constellation)>, NavigationError> {
        let io_err = |source| NavigationError::Io { path: self.root.clone(), source };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;
        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            if let Some(pair) = entry.file_name().to_str().and_then(parse_file_name) {
                found.push(pair);
            }
        }
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl NavigationIndex for FsNavigationIndex {
    async fn is_available(&self, req: &NavigationRequirement) -> Result<bool, NavigationError> {
        for (date, constellation) in req.pairs() {
            if !self.exists(&self.path_for(date, constellation)).await? {
                tracing::debug!(%date, %constellation, "navigation data not yet published");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn locate(&self, req: &NavigationRequirement) -> Result<NavigationData, NavigationError> {
        let mut data = NavigationData::default();
        for (date, constellation) in req.pairs() {
            let path = self.path_for(date, constellation);
            if !self.exists(&path).await? {
                return Err(NavigationError::Missing { date, constellation });
            }
            data.files.insert((date, constellation), path);
        }
        Ok(data)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{file_name, NavigationData, NavigationError, NavigationIndex};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use sq_core::{Constellation, NavigationRequirement};
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeNavigationState {
        published: BTreeSet<(NaiveDate, Constellation)>,
        checks: usize,
    }

    /// In-memory navigation index; data appears when the test publishes it.
    #[derive(Clone, Default)]
    pub struct FakeNavigationIndex {
        inner: Arc<Mutex<FakeNavigationState>>,
    }

    impl FakeNavigationIndex {
        pub fn new() -> Self {
            Self::default()
        }

        /// Publish data for `date` and each of `constellations`.
        pub fn publish(&self, date: NaiveDate, constellations: &[Constellation]) {
            let mut inner = self.inner.lock();
            for c in constellations {
                inner.published.insert((date, *c));
            }
        }

        /// Publish every constellation for `date`.
        pub fn publish_all(&self, date: NaiveDate) {
            self.publish(date, &Constellation::ALL);
        }

        /// Number of availability checks made so far
        pub fn checks(&self) -> usize {
            self.inner.lock().checks
        }
    }

    #[async_trait]
    impl NavigationIndex for FakeNavigationIndex {
        async fn is_available(
            &self,
            req: &NavigationRequirement,
        ) -> Result<bool, NavigationError> {
            let mut inner = self.inner.lock();
            inner.checks += 1;
            Ok(req.pairs().all(|pair| inner.published.contains(&pair)))
        }

        async fn locate(
            &self,
            req: &NavigationRequirement,
        ) -> Result<NavigationData, NavigationError> {
            let inner = self.inner.lock();
            let mut data = NavigationData::default();
            for (date, constellation) in req.pairs() {
                if !inner.published.contains(&(date, constellation)) {
                    return Err(NavigationError::Missing { date, constellation });
                }
                data.files.insert((date, constellation), PathBuf::from(file_name(date, constellation)));
            }
            Ok(data)
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNavigationIndex;

#[cfg(test)]
#[path = "navigation_tests.rs"]
mod tests;
