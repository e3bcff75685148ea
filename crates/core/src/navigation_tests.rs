// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};

fn snap(y: i32, m: u32, d: u32, h: u32, constellations: Vec<Constellation>) -> Snapshot {
    Snapshot {
        constellations,
        ..Snapshot::new(Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(), vec![0u8; 8])
    }
}

#[test]
fn collects_unique_dates_in_order() {
    let req = NavigationRequirement::for_snapshots(&[
        snap(2024, 3, 2, 23, vec![Constellation::Gps]),
        snap(2024, 3, 1, 1, vec![Constellation::Gps]),
        snap(2024, 3, 2, 0, vec![Constellation::Gps]),
    ]);
    let dates: Vec<_> = req.dates.iter().map(|d| d.to_string()).collect();
    assert_eq!(dates, vec!["2024-03-01", "2024-03-02"]);
    assert_eq!(req.latest_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
}

#[test]
fn unions_constellation_hints() {
    let req = NavigationRequirement::for_snapshots(&[
        snap(2024, 3, 1, 1, vec![Constellation::Gps]),
        snap(2024, 3, 1, 2, vec![Constellation::Beidou]),
    ]);
    assert_eq!(
        req.constellations.into_iter().collect::<Vec<_>>(),
        vec![Constellation::Gps, Constellation::Beidou]
    );
}

#[test]
fn missing_hint_means_all_constellations() {
    let req = NavigationRequirement::for_snapshots(&[snap(2024, 3, 1, 1, vec![])]);
    assert_eq!(req.constellations.len(), 3);
    assert_eq!(req.pairs().count(), 3);
}

#[test]
fn no_snapshots_is_empty() {
    let req = NavigationRequirement::for_snapshots(&[]);
    assert!(req.is_empty());
    assert_eq!(req.latest_date(), None);
    assert_eq!(req.pairs().count(), 0);
}

#[yare::parameterized(
    rapid_midnight   = { 2024, 3, 4, 0, 0,  (2024, 3, 4) },
    delayed_morning  = { 2024, 3, 4, 6, 0,  (2024, 3, 3) },
    rapid_same_hour  = { 2024, 3, 4, 0, 59, (2024, 3, 4) },
    new_year         = { 2024, 1, 1, 9, 0,  (2023, 12, 31) },
)]
fn last_needed_date_follows_release_hour(y: i32, m: u32, d: u32, h: u32, min: u32, expected: (i32, u32, u32)) {
    let release = Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap();
    let (ey, em, ed) = expected;
    assert_eq!(last_needed_date(release), NaiveDate::from_ymd_opt(ey, em, ed).unwrap());
}

#[test]
fn through_extends_only_past_the_latest_date() {
    let req = NavigationRequirement::for_snapshots(&[snap(2024, 3, 2, 1, vec![Constellation::Gps])]);
    let earlier = req.clone().through(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(earlier, req);

    let later = req.through(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert_eq!(later.latest_date(), NaiveDate::from_ymd_opt(2024, 3, 4));
    assert_eq!(later.pairs().count(), 2);
}

#[test]
fn through_leaves_an_empty_requirement_empty() {
    let req = NavigationRequirement::for_snapshots(&[]).through(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
    assert!(req.is_empty());
    assert_eq!(req.pairs().count(), 0);
}
