// Calibration module - step-length calibration and distance estimation
//
// This module provides the core of the crate:
// 1. StepNormalizer: turns raw hardware counter readings into session steps
// 2. CalibrationEngine: the calibration/distance state machine
// 3. displacement: ground-truth distance between position fixes
//
// The calibration workflow:
// 1. Walk with the default step length until the modeled distance reaches
//    the reference distance (30 m by default)
// 2. Derive the personal step length from the steps actually taken
// 3. Track distance from the calibration anchor; position fixes, when
//    enabled, keep refining the step length

pub mod displacement;
pub mod engine;
pub mod normalizer;
pub mod state;

pub use displacement::{FixOutcome, GeoPoint};
pub use engine::{CalibrationEngine, StepOutcome};
pub use normalizer::StepNormalizer;
pub use state::{CalibrationPhase, TrackerSnapshot};
