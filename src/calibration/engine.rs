// CalibrationEngine - calibration and distance-estimation state machine
//
// The engine starts from a default step length and measures the user's real
// step length by counting the steps needed to cover a fixed reference
// distance. Once calibrated it reports distance from the calibration anchor
// and an estimate of the steps needed for the estimation distance.
//
// Distance is always re-derived from a ledger base rather than accumulated:
//
//   distance = base_distance + (steps - base_steps) * step_length
//
// The base starts at (0, 0), moves to (target, anchor) when calibration
// completes and to (confirmed distance, steps) at each displacement fix.
// Repeated delivery of the same step count therefore yields the same
// distance.
//
// Every input is validated and the new values are computed before anything
// is written, so a rejected input leaves the engine untouched.

use crate::calibration::displacement::{FixOutcome, FixRecord, GeoPoint};
use crate::calibration::normalizer::StepNormalizer;
use crate::calibration::state::{CalibrationPhase, TrackerSnapshot};
use crate::config::{CalibrationConfig, DisplacementConfig};
use crate::error::TrackerError;

/// Result of a step counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Zero session steps; nothing changed beyond the normalizer latch
    Ignored,
    /// Still walking the reference distance
    Calibrating,
    /// This update crossed the reference distance
    CalibrationCompleted,
    /// Distance re-derived from the calibrated step length
    Tracked,
}

/// Single-owner calibration state for one session
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
    displacement: DisplacementConfig,
    normalizer: StepNormalizer,
    phase: CalibrationPhase,
    session_steps: u64,
    step_length_m: f64,
    cumulative_distance_m: f64,
    calibration_anchor: u64,
    base_distance_m: f64,
    base_steps: u64,
    last_fix: Option<FixRecord>,
}

/// Accept only strictly positive, finite step lengths
fn validate_step_length(value: f64) -> Result<f64, TrackerError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(TrackerError::InvalidStepLength { value })
    }
}

impl CalibrationEngine {
    /// Create an engine at session start
    ///
    /// # Arguments
    /// * `config` - Reference distances and default step length
    /// * `displacement` - Position fix handling
    ///
    /// An invalid `config` (non-positive distance or step length) is replaced
    /// by the defaults.
    pub fn new(config: CalibrationConfig, displacement: DisplacementConfig) -> Self {
        let config = config.validated();
        let step_length_m = config.default_step_length_m;
        Self {
            config,
            displacement,
            normalizer: StepNormalizer::new(),
            phase: CalibrationPhase::Uncalibrated,
            session_steps: 0,
            step_length_m,
            cumulative_distance_m: 0.0,
            calibration_anchor: 0,
            base_distance_m: 0.0,
            base_steps: 0,
            last_fix: None,
        }
    }

    /// Create with default configuration (30 m reference, 100 m estimate, 0.7 m step)
    pub fn new_default() -> Self {
        Self::new(CalibrationConfig::default(), DisplacementConfig::default())
    }

    /// Feed a raw hardware step counter reading
    ///
    /// # Returns
    /// * `Ok(StepOutcome)` - Reading accepted
    /// * `Err(TrackerError)` - Reading rejected; engine unchanged
    pub fn on_step_update(&mut self, raw_step_count: i64) -> Result<StepOutcome, TrackerError> {
        let steps = self.normalizer.peek(raw_step_count)?;
        let outcome = self.advance(steps)?;
        self.normalizer.commit(raw_step_count);
        Ok(outcome)
    }

    /// Apply a session step count to the state machine
    pub(crate) fn advance(&mut self, steps: u64) -> Result<StepOutcome, TrackerError> {
        if steps == 0 {
            return Ok(StepOutcome::Ignored);
        }

        let target = self.config.target_calibration_distance_m;
        let modeled = self.modeled_distance(steps);

        let outcome = match self.phase {
            CalibrationPhase::Uncalibrated | CalibrationPhase::Calibrating => {
                if modeled < target {
                    self.phase = CalibrationPhase::Calibrating;
                    self.cumulative_distance_m = modeled;
                    StepOutcome::Calibrating
                } else {
                    // Steps walked since the base must cover what is left of the
                    // reference distance; from session start this is target / steps.
                    let walked = steps.saturating_sub(self.base_steps);
                    let step_length =
                        validate_step_length((target - self.base_distance_m) / walked as f64)?;

                    self.step_length_m = step_length;
                    self.phase = CalibrationPhase::Calibrated;
                    self.calibration_anchor = steps;
                    self.cumulative_distance_m = target;
                    self.base_distance_m = target;
                    self.base_steps = steps;

                    log::info!(
                        "[CalibrationEngine] Calibrated at {} steps: step_length={:.4} m",
                        steps,
                        step_length
                    );
                    StepOutcome::CalibrationCompleted
                }
            }
            CalibrationPhase::Calibrated => {
                self.cumulative_distance_m = modeled;
                StepOutcome::Tracked
            }
        };

        self.session_steps = steps;
        Ok(outcome)
    }

    /// Feed an absolute position fix
    ///
    /// The first fix of a session is stored as the reference point. Each later
    /// fix measures the displacement from the previous one, which replaces the
    /// step-modeled distance for that interval and, when steps were taken,
    /// refines the step length.
    ///
    /// # Returns
    /// * `Ok(FixOutcome)` - Fix accepted
    /// * `Err(TrackerError)` - Fix rejected; engine unchanged
    pub fn on_displacement_fix(
        &mut self,
        latitude: f64,
        longitude: f64,
    ) -> Result<FixOutcome, TrackerError> {
        if !self.displacement.enabled {
            return Err(TrackerError::DisplacementDisabled);
        }

        let position = GeoPoint::new(latitude, longitude)?;

        let previous = match self.last_fix {
            Some(previous) => previous,
            None => {
                self.last_fix = Some(FixRecord {
                    position,
                    session_steps: self.session_steps,
                    distance_m: self.cumulative_distance_m,
                });
                return Ok(FixOutcome::Baseline);
            }
        };

        let displacement_m = previous
            .position
            .distance_to(&position, self.displacement.distance_model);
        if !displacement_m.is_finite() {
            return Err(TrackerError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        let steps_since_fix = self.session_steps.saturating_sub(previous.session_steps);
        let refined_step_length_m = if displacement_m > 0.0 && steps_since_fix > 0 {
            Some(validate_step_length(
                displacement_m / steps_since_fix as f64,
            )?)
        } else {
            None
        };

        if let Some(step_length) = refined_step_length_m {
            self.step_length_m = step_length;
        }
        self.cumulative_distance_m = previous.distance_m + displacement_m;
        self.base_distance_m = self.cumulative_distance_m;
        self.base_steps = self.session_steps;
        self.last_fix = Some(FixRecord {
            position,
            session_steps: self.session_steps,
            distance_m: self.cumulative_distance_m,
        });

        let calibration_completed = !self.phase.is_calibrated()
            && self.cumulative_distance_m >= self.config.target_calibration_distance_m;
        if calibration_completed {
            self.phase = CalibrationPhase::Calibrated;
            self.calibration_anchor = self.session_steps;
            log::info!(
                "[CalibrationEngine] Calibrated from position fix at {} steps: step_length={:.4} m",
                self.session_steps,
                self.step_length_m
            );
        }

        Ok(FixOutcome::Applied {
            displacement_m,
            steps_since_fix,
            refined_step_length_m,
            calibration_completed,
        })
    }

    /// Return every field to its session-start value
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone(), self.displacement.clone());
    }

    /// Steps needed to walk the estimation distance
    ///
    /// # Returns
    /// * `Ok(steps)` - `trunc(total_estimation_distance / step_length)`
    /// * `Err(TrackerError::NotCalibrated)` - Calibration not complete
    pub fn target_step_estimate(&self) -> Result<u64, TrackerError> {
        if !self.phase.is_calibrated() {
            return Err(TrackerError::NotCalibrated);
        }
        let estimate = self.config.total_estimation_distance_m / self.step_length_m;
        Ok(estimate.trunc() as u64)
    }

    /// Current observables
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            session_steps: self.session_steps,
            phase: self.phase,
            step_length_m: self.step_length_m,
            cumulative_distance_m: self.cumulative_distance_m,
            target_step_estimate: self.target_step_estimate().ok(),
            calibration_anchor: self.calibration_anchor,
            has_position_fix: self.last_fix.is_some(),
        }
    }

    /// Current calibration phase
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Steps since session start
    pub fn session_steps(&self) -> u64 {
        self.session_steps
    }

    /// Step length in use (m)
    pub fn step_length_m(&self) -> f64 {
        self.step_length_m
    }

    /// Distance walked this session (m)
    pub fn cumulative_distance_m(&self) -> f64 {
        self.cumulative_distance_m
    }

    /// Calibration settings in effect
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    fn modeled_distance(&self, steps: u64) -> f64 {
        let walked = steps.saturating_sub(self.base_steps);
        self.base_distance_m + walked as f64 * self.step_length_m
    }
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::new_default()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
