//! Configuration management for calibration and displacement tuning
//!
//! Settings are read from JSON at startup so the calibration reference
//! distances and the displacement correction policy can be tuned without
//! recompiling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Root of `stride_config.json`; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub displacement: DisplacementConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Calibration reference distances and starting step length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Reference distance walked to derive the personal step length (m)
    pub target_calibration_distance_m: f64,
    /// Distance the post-calibration step estimate is reported for (m)
    pub total_estimation_distance_m: f64,
    /// Step length assumed before calibration completes (m)
    pub default_step_length_m: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_calibration_distance_m: 30.0,
            total_estimation_distance_m: 100.0,
            // Average adult step
            default_step_length_m: 0.7,
        }
    }
}

/// Distance function used between two position fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Great-circle distance on a spherical earth
    #[default]
    Haversine,
    /// Flat-earth approximation, adequate for fixes a few hundred meters apart
    Equirectangular,
}

/// Absolute-position correction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    /// Accept position fixes and use them to refine step length
    pub enabled: bool,
    pub distance_model: DistanceModel,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance_model: DistanceModel::Haversine,
        }
    }
}

/// Channel and history sizes for snapshot fan-out and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Broadcast buffer for snapshot and metric subscribers
    pub channel_capacity: usize,
    /// Number of metric events retained for snapshots
    pub history_capacity: usize,
    /// Bounded queue between host callbacks and the command worker
    pub command_queue_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_capacity: 64,
            command_queue_capacity: 64,
        }
    }
}

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid config value for {}: {}", self.field, self.value)
    }
}

impl std::error::Error for ConfigError {}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError {
            field,
            value: value.to_string(),
        })
    }
}

fn require_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError {
            field,
            value: value.to_string(),
        })
    }
}

impl CalibrationConfig {
    /// Check every distance and the starting step length are strictly positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            "calibration.target_calibration_distance_m",
            self.target_calibration_distance_m,
        )?;
        require_positive(
            "calibration.total_estimation_distance_m",
            self.total_estimation_distance_m,
        )?;
        require_positive(
            "calibration.default_step_length_m",
            self.default_step_length_m,
        )
    }

    /// This config if valid, otherwise the defaults (with a warning)
    pub fn validated(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(err) => {
                log::warn!("[Config] {}; using default calibration settings", err);
                Self::default()
            }
        }
    }
}

impl AppConfig {
    /// Check every distance/length is strictly positive and every capacity non-zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;

        let tel = &self.telemetry;
        require_nonzero("telemetry.channel_capacity", tel.channel_capacity)?;
        require_nonzero("telemetry.history_capacity", tel.history_capacity)?;
        require_nonzero(
            "telemetry.command_queue_capacity",
            tel.command_queue_capacity,
        )?;
        Ok(())
    }

    /// This config if valid, otherwise the defaults (with a warning)
    ///
    /// Applied wherever a config built in code enters the engine, so the
    /// step length can never start at zero or below.
    pub fn validated(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(err) => {
                log::warn!("[Config] {}; using defaults", err);
                Self::default()
            }
        }
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// Never fails: any problem is logged and the defaults are used, so a bad
    /// override cannot stop the tracker from starting.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(config) => {
                log::info!("[Config] Loaded {:?}", path);
                config
            }
            Err(reason) => {
                log::warn!("[Config] {:?}: {}; falling back to defaults", path, reason);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path).map_err(|err| format!("unreadable ({err})"))?;
        let config: AppConfig =
            serde_json::from_str(&contents).map_err(|err| format!("invalid JSON ({err})"))?;
        config
            .validate()
            .map_err(|err| format!("rejected ({err})"))?;
        Ok(config)
    }

    /// Android builds have no bundled asset path to read from.
    #[cfg(target_os = "android")]
    pub fn load() -> Self {
        log::info!("[Config] Android build, using defaults");
        Self::default()
    }

    /// Desktop builds read `assets/stride_config.json` relative to the working directory.
    #[cfg(not(target_os = "android"))]
    pub fn load() -> Self {
        Self::load_from_file("assets/stride_config.json")
    }
}
