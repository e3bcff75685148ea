// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sq_core::test_support::{epoch, snapshot_at};
use sq_core::ReferencePoint;

fn sh(script: &str) -> CommandEngine {
    CommandEngine::new("sh").with_args(["-c", script, "engine"])
}

#[test]
fn arguments_carry_snapshot_metadata() {
    let engine = CommandEngine::new("engine").with_args(["--model", "fast"]);
    let mut navigation = NavigationData::default();
    navigation.files.insert(
        (epoch().date_naive(), sq_core::Constellation::Gps),
        PathBuf::from("/nav/2024_061_G.npy"),
    );
    let hints = JobHints {
        reference: Some(ReferencePoint { latitude: 51.5, longitude: -0.1 }),
        max_velocity: Some(30.0),
        ..JobHints::default()
    };

    let args = engine.arguments(&snapshot_at(epoch()), &navigation, &hints);

    assert_eq!(
        args,
        vec![
            "--model",
            "fast",
            "--epoch",
            "2024-03-01T12:00:00+00:00",
            "--constellations",
            "G",
            "--temperature",
            "20",
            "--reference",
            "51.5,-0.1",
            "--max-velocity",
            "30",
            "--navigation",
            "/nav/2024_061_G.npy",
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn parses_estimate_from_stdout() {
    let engine = sh(r#"wc -c >/dev/null; echo '{"latitude":1.5,"longitude":2.5,"time_correction_s":0.1,"horizontal_error_m":9.0}'"#);
    let estimate = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap();
    assert_eq!(estimate.latitude, 1.5);
    assert_eq!(estimate.horizontal_error_m, 9.0);
}

#[cfg(unix)]
#[tokio::test]
async fn parses_typed_failure() {
    let engine = sh(r#"cat >/dev/null; echo '{"error":"no_fix","message":"solver diverged"}'"#);
    let err = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap_err();
    assert_eq!(err, PositioningError::new(PositioningErrorKind::NoFix, "solver diverged"));
    assert!(!err.is_fatal());
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_internal() {
    let engine = sh("echo boom >&2; exit 3");
    let err = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, PositioningErrorKind::Internal);
    assert!(err.message.contains("boom"), "{}", err.message);
}

#[cfg(unix)]
#[tokio::test]
async fn garbage_output_is_internal() {
    let engine = sh("cat >/dev/null; echo not-json");
    let err = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, PositioningErrorKind::Internal);
}

#[cfg(unix)]
#[tokio::test]
async fn slow_engine_times_out() {
    let engine = sh("sleep 5").with_timeout(Duration::from_millis(50));
    let err = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap_err();
    assert!(err.message.contains("timed out"), "{}", err.message);
}

#[tokio::test]
async fn missing_program_is_internal() {
    let engine = CommandEngine::new("/nonexistent/engine");
    let err = engine
        .estimate(&snapshot_at(epoch()), &NavigationData::default(), &JobHints::default())
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn fake_engine_records_calls_and_failures() {
    let engine = FakeEngine::new();
    let second = epoch() + chrono::Duration::minutes(1);
    engine.fail_at(second, PositioningError::new(PositioningErrorKind::InsufficientSatellites, "3 sats"));

    let nav = NavigationData::default();
    let hints = JobHints::default();
    assert!(engine.estimate(&snapshot_at(epoch()), &nav, &hints).await.is_ok());
    let err = engine.estimate(&snapshot_at(second), &nav, &hints).await.unwrap_err();

    assert_eq!(err.kind, PositioningErrorKind::InsufficientSatellites);
    assert_eq!(engine.calls().len(), 2);
    assert_eq!(engine.max_in_flight(), 1);
}
