// Calibration phase and the read-only observables published after each update
//
// The snapshot is what the host renders; it is rebuilt from the engine after
// every accepted or rejected input and never mutated in place.

use serde::{Deserialize, Serialize};

/// Calibration phase of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    /// No steps observed yet this session
    #[default]
    Uncalibrated,
    /// Walking the reference distance with the default step length
    Calibrating,
    /// Personal step length derived; distance tracked from the anchor
    Calibrated,
}

impl CalibrationPhase {
    /// Get human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationPhase::Uncalibrated => "UNCALIBRATED",
            CalibrationPhase::Calibrating => "CALIBRATING",
            CalibrationPhase::Calibrated => "CALIBRATED",
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationPhase::Calibrated)
    }
}

/// Observable tracker state after a call
///
/// `target_step_estimate` is `None` until the session is calibrated; it is
/// never filled with a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    /// Steps since the session's first counter sample
    pub session_steps: u64,
    pub phase: CalibrationPhase,
    /// Current step length estimate in meters
    pub step_length_m: f64,
    /// Distance walked this session in meters
    pub cumulative_distance_m: f64,
    /// Steps needed for the configured estimation distance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_step_estimate: Option<u64>,
    /// Session step count at which calibration completed (0 before)
    pub calibration_anchor: u64,
    /// Whether a position fix is held for the next displacement sample
    pub has_position_fix: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_default_is_uncalibrated() {
        assert_eq!(CalibrationPhase::default(), CalibrationPhase::Uncalibrated);
        assert!(!CalibrationPhase::Calibrating.is_calibrated());
        assert!(CalibrationPhase::Calibrated.is_calibrated());
    }

    #[test]
    fn test_snapshot_omits_unavailable_estimate() {
        let snapshot = TrackerSnapshot {
            session_steps: 10,
            phase: CalibrationPhase::Calibrating,
            step_length_m: 0.7,
            cumulative_distance_m: 7.0,
            target_step_estimate: None,
            calibration_anchor: 0,
            has_position_fix: false,
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"phase\":\"calibrating\""));
        assert!(
            !json.contains("target_step_estimate"),
            "estimate must be absent before calibration: {}",
            json
        );

        let parsed: TrackerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
