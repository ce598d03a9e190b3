// Tracker error types and constants

use crate::error::ErrorCode;
use log::{error, warn};
use std::fmt;

/// Tracker error code constants exposed to the host via FFI
///
/// Single source of truth for the numeric codes shared with the host layer.
///
/// Error code range: 3001-3008
pub struct TrackerErrorCodes {}

impl TrackerErrorCodes {
    /// Raw step counter value was negative
    pub const NEGATIVE_STEP_COUNT: i32 = 3001;

    /// Raw step counter went backwards within a session
    pub const NON_MONOTONIC_STEP_COUNT: i32 = 3002;

    /// Position fix had NaN/infinite or out-of-range coordinates
    pub const INVALID_COORDINATES: i32 = 3003;

    /// Derived step length was zero, negative or not finite
    pub const INVALID_STEP_LENGTH: i32 = 3004;

    /// Position fix delivered while displacement correction is off
    pub const DISPLACEMENT_DISABLED: i32 = 3005;

    /// Target step estimate requested before calibration completed
    pub const NOT_CALIBRATED: i32 = 3006;

    /// Tracker state mutex was poisoned
    pub const STATE_POISONED: i32 = 3007;

    /// Command queue closed or saturated
    pub const ENGINE_UNAVAILABLE: i32 = 3008;
}

/// Coarse classification of a [`TrackerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input rejected at the boundary; state untouched
    InvalidInput,
    /// Query made in a phase where the value does not exist
    PreconditionViolation,
    /// Lock or channel failure inside the crate
    Internal,
}

/// Log a tracker error with structured context
///
/// Rejected inputs are routine (sensor glitches, GPS dropouts) and are
/// logged at warn level; internal failures are logged as errors.
pub fn log_tracker_error(err: &TrackerError, context: &str) {
    match err.kind() {
        ErrorKind::InvalidInput | ErrorKind::PreconditionViolation => warn!(
            "Tracker input rejected in {}: code={}, component=CalibrationEngine, message={}",
            context,
            err.code(),
            err.message()
        ),
        ErrorKind::Internal => error!(
            "Tracker error in {}: code={}, component=TrackerManager, message={}",
            context,
            err.code(),
            err.message()
        ),
    }
}

/// Step/distance tracker errors
///
/// Every `InvalidInput` variant is returned without mutating tracker state.
///
/// Error code range: 3001-3008
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// Raw step counter value below zero
    NegativeStepCount { raw: i64 },

    /// Raw step counter lower than the last accepted value
    NonMonotonicStepCount { previous: i64, raw: i64 },

    /// Latitude/longitude not finite or out of range
    InvalidCoordinates { latitude: f64, longitude: f64 },

    /// Step length derivation produced a non-positive or non-finite value
    InvalidStepLength { value: f64 },

    /// Displacement correction switched off in configuration
    DisplacementDisabled,

    /// Target step estimate is only defined once calibrated
    NotCalibrated,

    /// Tracker state mutex was poisoned
    StatePoisoned,

    /// Command worker no longer accepting input
    EngineUnavailable { reason: String },
}

impl TrackerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::NegativeStepCount { .. }
            | TrackerError::NonMonotonicStepCount { .. }
            | TrackerError::InvalidCoordinates { .. }
            | TrackerError::InvalidStepLength { .. }
            | TrackerError::DisplacementDisabled => ErrorKind::InvalidInput,
            TrackerError::NotCalibrated => ErrorKind::PreconditionViolation,
            TrackerError::StatePoisoned | TrackerError::EngineUnavailable { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl ErrorCode for TrackerError {
    fn code(&self) -> i32 {
        match self {
            TrackerError::NegativeStepCount { .. } => TrackerErrorCodes::NEGATIVE_STEP_COUNT,
            TrackerError::NonMonotonicStepCount { .. } => {
                TrackerErrorCodes::NON_MONOTONIC_STEP_COUNT
            }
            TrackerError::InvalidCoordinates { .. } => TrackerErrorCodes::INVALID_COORDINATES,
            TrackerError::InvalidStepLength { .. } => TrackerErrorCodes::INVALID_STEP_LENGTH,
            TrackerError::DisplacementDisabled => TrackerErrorCodes::DISPLACEMENT_DISABLED,
            TrackerError::NotCalibrated => TrackerErrorCodes::NOT_CALIBRATED,
            TrackerError::StatePoisoned => TrackerErrorCodes::STATE_POISONED,
            TrackerError::EngineUnavailable { .. } => TrackerErrorCodes::ENGINE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            TrackerError::NegativeStepCount { raw } => {
                format!("Step counter value must be non-negative (got {})", raw)
            }
            TrackerError::NonMonotonicStepCount { previous, raw } => {
                format!(
                    "Step counter went backwards: previous {}, got {}",
                    previous, raw
                )
            }
            TrackerError::InvalidCoordinates {
                latitude,
                longitude,
            } => {
                format!("Invalid coordinates: lat={}, lon={}", latitude, longitude)
            }
            TrackerError::InvalidStepLength { value } => {
                format!("Derived step length must be positive (got {})", value)
            }
            TrackerError::DisplacementDisabled => {
                "Displacement correction is disabled".to_string()
            }
            TrackerError::NotCalibrated => {
                "Target step estimate unavailable: calibration not complete".to_string()
            }
            TrackerError::StatePoisoned => "Tracker state lock poisoned".to_string(),
            TrackerError::EngineUnavailable { reason } => {
                format!("Tracker engine unavailable: {}", reason)
            }
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TrackerError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for TrackerError {}
