//! Input messages delivered to the tracker.
//!
//! The same JSON shape is used by the command queue, the debug HTTP
//! `/input` endpoint and replay traces.

use serde::{Deserialize, Serialize};

/// One host callback, as a message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerInput {
    /// Raw hardware step counter reading
    #[serde(rename = "steps")]
    StepSample {
        #[serde(rename = "raw")]
        raw_count: i64,
    },
    /// Absolute position fix in decimal degrees
    #[serde(rename = "fix")]
    PositionFix { latitude: f64, longitude: f64 },
    Reset,
}

impl TrackerInput {
    /// Short label used in logs and telemetry contexts
    pub fn label(&self) -> &'static str {
        match self {
            Self::StepSample { .. } => "step_sample",
            Self::PositionFix { .. } => "position_fix",
            Self::Reset => "reset",
        }
    }
}
