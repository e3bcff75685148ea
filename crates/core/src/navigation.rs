// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Navigation data a job needs before it can be positioned.

use crate::snapshot::{Constellation, Snapshot};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::collections::BTreeSet;

/// The (date, constellation) pairs whose navigation data must be published
/// before a job's snapshots can be processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationRequirement {
    pub dates: BTreeSet<NaiveDate>,
    pub constellations: BTreeSet<Constellation>,
}

impl NavigationRequirement {
    /// UTC capture dates of all snapshots, and the union of their
    /// constellation hints.
    pub fn for_snapshots(snapshots: &[Snapshot]) -> Self {
        let mut req = Self::default();
        for snapshot in snapshots {
            req.dates.insert(snapshot.captured_at.date_naive());
            req.constellations.extend(snapshot.required_constellations().iter().copied());
        }
        req
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() || self.constellations.is_empty()
    }

    /// Every (date, constellation) pair, in date order.
    pub fn pairs(&self) -> impl Iterator<Item = (NaiveDate, Constellation)> + '_ {
        self.dates.iter().flat_map(move |d| self.constellations.iter().map(move |c| (*d, *c)))
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Also require navigation data up to `date`, if the capture dates stop
    /// short of it. A requirement without constellations stays empty.
    pub fn through(mut self, date: NaiveDate) -> Self {
        if !self.constellations.is_empty() && self.latest_date().map_or(true, |d| d < date) {
            self.dates.insert(date);
        }
        self
    }
}

/// Last navigation date that must be published before a job held back until
/// `not_before` may run.
///
/// Rapid products are released at midnight for the day that just ended, so a
/// job due exactly at 00h needs that day's data; at any other hour the
/// previous day's data is the latest that can be expected.
pub fn last_needed_date(not_before: DateTime<Utc>) -> NaiveDate {
    let date = not_before.date_naive();
    if not_before.hour() == 0 {
        date
    } else {
        date.pred_opt().unwrap_or(date)
    }
}

#[cfg(test)]
#[path = "navigation_tests.rs"]
mod tests;
