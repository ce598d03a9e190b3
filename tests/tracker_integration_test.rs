//! Integration tests for the tracker across the public API
//!
//! These tests drive the engine the way a host does:
//! - Step counter readings and position fixes through `EngineHandle`
//! - Message-passing delivery through the command queue
//! - Error codes surfaced to the host
//! - Telemetry recorded for accepted and rejected inputs

use stride_calibrator::calibration::{CalibrationPhase, TrackerSnapshot};
use stride_calibrator::config::{AppConfig, CalibrationConfig, DistanceModel};
use stride_calibrator::engine::{EngineHandle, TrackerInput};
use stride_calibrator::error::{ErrorCode, TrackerError};
use stride_calibrator::telemetry::{self, MetricEvent};

fn engine() -> EngineHandle {
    EngineHandle::from_config(AppConfig::default())
}

fn north_of_equator(meters: f64) -> f64 {
    (meters / 6_371_000.0).to_degrees()
}

#[test]
fn session_calibrates_and_tracks_distance() {
    let engine = engine();
    let mut last = None;
    for raw in [100, 110, 130, 145, 160] {
        last = Some(engine.on_step_update(raw).expect("step accepted"));
    }

    let snapshot: TrackerSnapshot = last.unwrap();
    assert_eq!(snapshot.phase, CalibrationPhase::Calibrated);
    assert_eq!(snapshot.calibration_anchor, 45);
    assert_eq!(snapshot.session_steps, 60);
    assert!((snapshot.cumulative_distance_m - 40.0).abs() < 1e-9);
    assert_eq!(engine.target_step_estimate(), Ok(150));
}

#[test]
fn distance_is_idempotent_after_calibration() {
    let engine = engine();
    for raw in [0, 45, 70] {
        engine.on_step_update(raw).unwrap();
    }
    let first = engine.snapshot().unwrap();
    let repeated = engine.on_step_update(70).unwrap();

    assert_eq!(first, repeated);
}

#[test]
fn host_sees_error_codes() {
    let engine = engine();
    engine.on_step_update(50).unwrap();

    let negative = engine.on_step_update(-1).unwrap_err();
    let decreasing = engine.on_step_update(49).unwrap_err();
    let coordinates = engine.on_displacement_fix(0.0, 181.0).unwrap_err();
    let estimate = engine.target_step_estimate().unwrap_err();

    assert_eq!(negative.code(), 3001);
    assert_eq!(decreasing.code(), 3002);
    assert_eq!(coordinates.code(), 3003);
    assert_eq!(estimate, TrackerError::NotCalibrated);
    assert_eq!(estimate.code(), 3006);
}

#[test]
fn fixes_refine_step_length() {
    let engine = engine();
    engine.on_step_update(0).unwrap();
    engine.on_displacement_fix(0.0, 0.0).unwrap();
    engine.on_step_update(250).unwrap();
    let snapshot = engine
        .on_displacement_fix(north_of_equator(200.0), 0.0)
        .unwrap();

    assert!((snapshot.step_length_m - 0.8).abs() < 1e-9);
    assert!((snapshot.cumulative_distance_m - 200.0).abs() < 1e-6);
}

#[test]
fn configuration_drives_calibration() {
    let mut config = AppConfig::default();
    config.displacement.distance_model = DistanceModel::Equirectangular;
    config.calibration = CalibrationConfig {
        target_calibration_distance_m: 20.0,
        ..CalibrationConfig::default()
    };
    let engine = EngineHandle::from_config(config);

    engine.on_step_update(0).unwrap();
    let snapshot = engine.on_step_update(29).unwrap();
    assert_eq!(snapshot.phase, CalibrationPhase::Calibrated);
    assert!((snapshot.step_length_m - 20.0 / 29.0).abs() < 1e-12);
}

#[tokio::test]
async fn queued_session_publishes_snapshots() {
    let engine = engine();
    let mut rx = engine.subscribe_snapshots().expect("snapshot channel");

    for raw in [100, 110, 130] {
        engine
            .submit(TrackerInput::StepSample { raw_count: raw })
            .await
            .unwrap();
    }
    let last = engine
        .request(TrackerInput::StepSample { raw_count: 145 })
        .await
        .unwrap();
    assert_eq!(last.phase, CalibrationPhase::Calibrated);

    let mut received = Vec::new();
    while let Ok(snapshot) = rx.try_recv() {
        received.push(snapshot.session_steps);
    }
    assert_eq!(received, vec![0, 10, 30, 45]);
}

#[test]
fn rejections_are_recorded_in_telemetry() {
    let mut rx = telemetry::hub().collector().subscribe();
    let engine = engine();
    engine.on_step_update(10).unwrap();
    let _ = engine.on_step_update(-7);

    let mut recorded = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(
            &event,
            MetricEvent::InputRejected { code: 3001, context, .. } if context == "on_step_update"
        ) {
            recorded = true;
        }
    }
    assert!(recorded, "expected InputRejected event in telemetry stream");
}
