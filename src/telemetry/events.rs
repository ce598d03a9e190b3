//! Core telemetry event types describing diagnostics data exposed to
//! CLI/HTTP surfaces and host streams.

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationPhase;
use crate::error::ErrorKind;

/// Rich metric events covering step updates, calibration and rejected input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    StepApplied {
        session_steps: u64,
        distance_m: f64,
        phase: CalibrationPhase,
    },
    CalibrationCompleted {
        session_steps: u64,
        step_length_m: f64,
        target_step_estimate: Option<u64>,
    },
    StepLengthRefined {
        displacement_m: f64,
        steps_since_fix: u64,
        step_length_m: f64,
    },
    StepLengthStats {
        avg_m: f64,
        min_m: f64,
        max_m: f64,
        sample_count: usize,
    },
    QueueOccupancy {
        channel: String,
        percent: f32,
    },
    InputRejected {
        code: i32,
        kind: ErrorKind,
        context: String,
    },
    SessionReset {
        timestamp_ms: u64,
    },
}
