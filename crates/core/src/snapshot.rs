// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Raw signal snapshots and their per-snapshot positioning outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Satellite constellation whose navigation data a snapshot needs.
///
/// The single-letter code matches the RINEX system identifier and the suffix
/// of the pre-processed navigation files (`2024_061_G.npy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constellation {
    Gps,
    Galileo,
    Beidou,
}

impl Constellation {
    pub const ALL: [Constellation; 3] =
        [Constellation::Gps, Constellation::Galileo, Constellation::Beidou];

    pub fn code(self) -> char {
        match self {
            Constellation::Gps => 'G',
            Constellation::Galileo => 'E',
            Constellation::Beidou => 'C',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'G' => Some(Constellation::Gps),
            'E' => Some(Constellation::Galileo),
            'C' => Some(Constellation::Beidou),
            _ => None,
        }
    }
}

crate::simple_display! {
    Constellation {
        Gps => "gps",
        Galileo => "galileo",
        Beidou => "beidou",
    }
}

/// One short raw capture of satellite signal energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Nominal capture epoch reported by the receiver
    pub captured_at: DateTime<Utc>,
    /// Constellations to use; empty means all of [`Constellation::ALL`]
    #[serde(default)]
    pub constellations: Vec<Constellation>,
    /// Receiver temperature at capture time, used for clock drift correction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Raw sign bits as captured
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn new(captured_at: DateTime<Utc>, data: impl Into<Vec<u8>>) -> Self {
        Self { captured_at, constellations: Vec::new(), temperature: None, data: data.into() }
    }

    /// Constellations this snapshot needs navigation data for.
    pub fn required_constellations(&self) -> &[Constellation] {
        if self.constellations.is_empty() {
            &Constellation::ALL
        } else {
            &self.constellations
        }
    }
}

/// Position estimate produced by the positioning engine for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// Degrees, WGS84
    pub latitude: f64,
    /// Degrees, WGS84
    pub longitude: f64,
    /// Estimated minus nominal capture time, in seconds
    pub time_correction_s: f64,
    /// Horizontal uncertainty in metres
    pub horizontal_error_m: f64,
}

/// Category of a per-snapshot positioning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositioningErrorKind {
    /// Too few satellites acquired for a fix
    InsufficientSatellites,
    /// Satellites acquired but the solver did not converge
    NoFix,
    /// Snapshot bytes are truncated or malformed
    InvalidSnapshot,
    /// Navigation data could not be read or does not cover the epoch
    NavigationData,
    /// The engine itself failed (crash, bad output, timeout)
    Internal,
}

impl PositioningErrorKind {
    /// A fatal error fails the whole job; anything else only loses the one
    /// snapshot.
    pub fn is_fatal(self) -> bool {
        matches!(self, PositioningErrorKind::NavigationData | PositioningErrorKind::Internal)
    }
}

crate::simple_display! {
    PositioningErrorKind {
        InsufficientSatellites => "insufficient_satellites",
        NoFix => "no_fix",
        InvalidSnapshot => "invalid_snapshot",
        NavigationData => "navigation_data",
        Internal => "internal",
    }
}

/// Per-snapshot failure reported by the positioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PositioningError {
    pub kind: PositioningErrorKind,
    pub message: String,
}

impl PositioningError {
    pub fn new(kind: PositioningErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

/// Terminal result for one snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SnapshotOutcome {
    Estimate(PositionEstimate),
    Failed(PositioningError),
    /// Captured before deployment or after recovery; never positioned
    OutsideDeployment,
}

impl SnapshotOutcome {
    pub fn estimate(&self) -> Option<&PositionEstimate> {
        match self {
            SnapshotOutcome::Estimate(e) => Some(e),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PositioningError> {
        match self {
            SnapshotOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Result<PositionEstimate, PositioningError>> for SnapshotOutcome {
    fn from(result: Result<PositionEstimate, PositioningError>) -> Self {
        match result {
            Ok(estimate) => SnapshotOutcome::Estimate(estimate),
            Err(error) => SnapshotOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
