// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Positioning engine adapters
//!
//! The engine is a pure function from one snapshot and its navigation data to
//! a position estimate or a typed failure. The worker never looks inside it.

use crate::navigation::NavigationData;
use async_trait::async_trait;
use serde::Deserialize;
use sq_core::{JobHints, PositionEstimate, PositioningError, PositioningErrorKind, Snapshot};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Default upper bound on one engine invocation.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(120);

/// Estimates a position for one snapshot.
#[async_trait]
pub trait PositioningEngine: Clone + Send + Sync + 'static {
    async fn estimate(
        &self,
        snapshot: &Snapshot,
        navigation: &NavigationData,
        hints: &JobHints,
    ) -> Result<PositionEstimate, PositioningError>;
}

/// What the engine executable prints on stdout.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EngineReply {
    Estimate(PositionEstimate),
    Failure {
        error: PositioningErrorKind,
        #[serde(default)]
        message: String,
    },
}

/// Runs an external executable once per snapshot.
///
/// The raw snapshot bytes go to stdin. Metadata is passed as arguments after
/// any configured base arguments:
///
/// ```text
/// <program> [args..] --epoch <rfc3339> --constellations <codes>
///     [--temperature <celsius>] [--reference <lat>,<lng>] [--max-velocity <m/s>]
///     --navigation <file>...
/// ```
///
/// The executable prints either a [`PositionEstimate`] as JSON, or
/// `{"error": "<kind>", "message": "..."}`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: DEFAULT_ENGINE_TIMEOUT }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn arguments(
        &self,
        snapshot: &Snapshot,
        navigation: &NavigationData,
        hints: &JobHints,
    ) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--epoch".into());
        args.push(snapshot.captured_at.to_rfc3339());
        args.push("--constellations".into());
        args.push(snapshot.required_constellations().iter().map(|c| c.code()).collect());
        if let Some(t) = snapshot.temperature {
            args.push("--temperature".into());
            args.push(t.to_string());
        }
        if let Some(r) = hints.reference {
            args.push("--reference".into());
            args.push(format!("{},{}", r.latitude, r.longitude));
        }
        if let Some(v) = hints.max_velocity {
            args.push("--max-velocity".into());
            args.push(v.to_string());
        }
        for path in navigation.paths() {
            args.push("--navigation".into());
            args.push(path.display().to_string());
        }
        args
    }

    async fn run(&self, args: Vec<String>, input: &[u8]) -> std::io::Result<std::process::Output> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        // A child that exits without reading stdin closes the pipe early;
        // its exit status and output are what matter.
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e);
            }
        }
        Ok(output)
    }
}

fn internal(message: impl Into<String>) -> PositioningError {
    PositioningError::new(PositioningErrorKind::Internal, message)
}

#[async_trait]
impl PositioningEngine for CommandEngine {
    async fn estimate(
        &self,
        snapshot: &Snapshot,
        navigation: &NavigationData,
        hints: &JobHints,
    ) -> Result<PositionEstimate, PositioningError> {
        let args = self.arguments(snapshot, navigation, hints);
        let output = match tokio::time::timeout(self.timeout, self.run(args, &snapshot.data)).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(internal(format!("{}: {}", self.program.display(), e)));
            }
            Err(_) => {
                return Err(internal(format!("engine timed out after {:?}", self.timeout)));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(internal(format!(
                "engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        match serde_json::from_slice::<EngineReply>(&output.stdout) {
            Ok(EngineReply::Estimate(estimate)) => Ok(estimate),
            Ok(EngineReply::Failure { error, message }) => Err(PositioningError::new(error, message)),
            Err(e) => Err(internal(format!("unreadable engine output: {}", e))),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::PositioningEngine;
    use crate::navigation::NavigationData;
    use async_trait::async_trait;
    use chrono::{DateTime, Timelike, Utc};
    use parking_lot::Mutex;
    use sq_core::{JobHints, PositionEstimate, PositioningError, Snapshot};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Recorded engine invocation
    #[derive(Debug, Clone)]
    pub struct EngineCall {
        pub captured_at: DateTime<Utc>,
        pub navigation_files: usize,
    }

    #[derive(Default)]
    struct FakeEngineState {
        calls: Vec<EngineCall>,
        failures: HashMap<DateTime<Utc>, PositioningError>,
        panics: Vec<DateTime<Utc>>,
        delay: Duration,
        in_flight: usize,
        max_in_flight: usize,
    }

    /// Fake engine that estimates every snapshot unless told otherwise.
    #[derive(Clone, Default)]
    pub struct FakeEngine {
        inner: Arc<Mutex<FakeEngineState>>,
    }

    impl FakeEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the snapshot captured at `at` with `error`.
        pub fn fail_at(&self, at: DateTime<Utc>, error: PositioningError) {
            self.inner.lock().failures.insert(at, error);
        }

        /// Panic while estimating the snapshot captured at `at`.
        pub fn panic_at(&self, at: DateTime<Utc>) {
            self.inner.lock().panics.push(at);
        }

        /// Hold every estimate for `delay` (on the tokio clock).
        pub fn set_delay(&self, delay: Duration) {
            self.inner.lock().delay = delay;
        }

        pub fn calls(&self) -> Vec<EngineCall> {
            self.inner.lock().calls.clone()
        }

        /// Largest number of estimates that ran at the same time
        pub fn max_in_flight(&self) -> usize {
            self.inner.lock().max_in_flight
        }

        /// Estimate the fake returns for a snapshot captured at `at`.
        pub fn estimate_for(at: DateTime<Utc>) -> PositionEstimate {
            PositionEstimate {
                latitude: 51.75,
                longitude: -1.25 + f64::from(at.minute()) * 1e-4,
                time_correction_s: 0.5,
                horizontal_error_m: 12.0,
            }
        }
    }

    #[async_trait]
    impl PositioningEngine for FakeEngine {
        #[allow(clippy::panic)]
        async fn estimate(
            &self,
            snapshot: &Snapshot,
            navigation: &NavigationData,
            _hints: &JobHints,
        ) -> Result<PositionEstimate, PositioningError> {
            let at = snapshot.captured_at;
            let (delay, should_panic) = {
                let mut inner = self.inner.lock();
                inner.calls.push(EngineCall { captured_at: at, navigation_files: navigation.files.len() });
                inner.in_flight += 1;
                inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
                (inner.delay, inner.panics.contains(&at))
            };

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let failure = {
                let mut inner = self.inner.lock();
                inner.in_flight -= 1;
                inner.failures.get(&at).cloned()
            };
            if should_panic {
                panic!("fake engine panic for snapshot at {}", at);
            }
            match failure {
                Some(error) => Err(error),
                None => Ok(Self::estimate_for(at)),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{EngineCall, FakeEngine};

#[cfg(test)]
#[path = "positioning_tests.rs"]
mod tests;
