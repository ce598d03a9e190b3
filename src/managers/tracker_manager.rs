// TrackerManager: single owner of the calibration engine
//
// Single Responsibility: serialize step and position inputs into one engine
// Step updates and position fixes may arrive from different callback contexts;
// both go through the same mutex so every transition is atomic.
// Queued inputs carry the session number they were submitted in; a reset
// starts a new session, and inputs from an older one are dropped.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::calibration::{CalibrationEngine, FixOutcome, StepOutcome, TrackerSnapshot};
use crate::config::{CalibrationConfig, DisplacementConfig};
use crate::engine::TrackerInput;
use crate::error::{log_tracker_error, TrackerError};
use crate::telemetry;

/// Manages the calibration engine for one walking session
///
/// This manager handles:
/// - Step counter updates and position fixes
/// - Session reset
/// - Error logging and telemetry for rejected input
/// - Thread-safe lock management
///
/// # Example
/// ```ignore
/// let manager = TrackerManager::new(CalibrationConfig::default(), DisplacementConfig::default());
/// manager.on_step_update(100)?;
/// manager.on_step_update(145)?;
/// let snapshot = manager.snapshot()?;
/// ```
pub struct TrackerManager {
    engine: Arc<Mutex<CalibrationEngine>>,
    /// Session number, bumped by every reset. Lock order: session, then engine.
    session: RwLock<u64>,
}

impl TrackerManager {
    /// Create a new TrackerManager at session start
    pub fn new(calibration: CalibrationConfig, displacement: DisplacementConfig) -> Self {
        Self {
            engine: Arc::new(Mutex::new(CalibrationEngine::new(calibration, displacement))),
            session: RwLock::new(0),
        }
    }

    /// Apply one input on the calling thread
    pub fn apply(&self, input: TrackerInput) -> Result<TrackerSnapshot, TrackerError> {
        match input {
            TrackerInput::StepSample { raw_count } => self.on_step_update(raw_count),
            TrackerInput::PositionFix {
                latitude,
                longitude,
            } => self.on_displacement_fix(latitude, longitude),
            TrackerInput::Reset => self.reset(),
        }
    }

    /// Current session number, to stamp an input that is applied later
    pub fn session(&self) -> Result<u64, TrackerError> {
        Ok(*self.read_session("session")?)
    }

    /// Apply an input submitted during `session`
    ///
    /// The session lock is held across the update, so a reset either waits
    /// for it to finish or has already started a new session, in which case
    /// the input is dropped.
    ///
    /// # Errors
    /// - `EngineUnavailable` when a reset happened after the input was submitted
    pub fn apply_in_session(
        &self,
        session: u64,
        input: TrackerInput,
    ) -> Result<TrackerSnapshot, TrackerError> {
        if let TrackerInput::Reset = input {
            let mut current = self.write_session("reset")?;
            Self::ensure_session(*current, session, input)?;
            return self.reset_session(&mut current);
        }

        let current = self.read_session(input.label())?;
        Self::ensure_session(*current, session, input)?;
        self.apply(input)
    }

    /// Apply a raw step counter reading
    ///
    /// # Returns
    /// * `Ok(TrackerSnapshot)` - Observables after the update
    /// * `Err(TrackerError)` - Reading rejected; state unchanged
    ///
    /// # Errors
    /// - Negative or decreasing raw count
    /// - Lock poisoning on engine state
    pub fn on_step_update(&self, raw_step_count: i64) -> Result<TrackerSnapshot, TrackerError> {
        let mut engine = self.lock_engine("on_step_update")?;

        let outcome = engine
            .on_step_update(raw_step_count)
            .inspect_err(|err| Self::reject(err, "on_step_update"))?;
        let snapshot = engine.snapshot();

        match outcome {
            StepOutcome::Ignored => {}
            StepOutcome::CalibrationCompleted => {
                telemetry::hub().record_step(&snapshot);
                telemetry::hub().record_calibration(&snapshot);
            }
            StepOutcome::Calibrating | StepOutcome::Tracked => {
                telemetry::hub().record_step(&snapshot);
            }
        }

        Ok(snapshot)
    }

    /// Apply an absolute position fix
    ///
    /// # Returns
    /// * `Ok(TrackerSnapshot)` - Observables after the fix
    /// * `Err(TrackerError)` - Fix rejected; state unchanged
    ///
    /// # Errors
    /// - Displacement correction disabled
    /// - Coordinates not finite or out of range
    /// - Lock poisoning on engine state
    pub fn on_displacement_fix(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<TrackerSnapshot, TrackerError> {
        let mut engine = self.lock_engine("on_displacement_fix")?;

        let outcome = engine
            .on_displacement_fix(latitude, longitude)
            .inspect_err(|err| Self::reject(err, "on_displacement_fix"))?;
        let snapshot = engine.snapshot();

        telemetry::hub().record_fix(&outcome);
        if let FixOutcome::Applied {
            calibration_completed: true,
            ..
        } = outcome
        {
            telemetry::hub().record_calibration(&snapshot);
        }

        Ok(snapshot)
    }

    /// Return the session to its start state
    ///
    /// Inputs still queued from before the reset will not be applied.
    pub fn reset(&self) -> Result<TrackerSnapshot, TrackerError> {
        let mut session = self.write_session("reset")?;
        self.reset_session(&mut session)
    }

    fn reset_session(&self, session: &mut u64) -> Result<TrackerSnapshot, TrackerError> {
        let mut engine = self.lock_engine("reset")?;
        engine.reset();
        *session = session.wrapping_add(1);
        log::info!("[TrackerManager] Session reset; session {}", session);
        telemetry::hub().record_reset();
        Ok(engine.snapshot())
    }

    /// Current observables
    pub fn snapshot(&self) -> Result<TrackerSnapshot, TrackerError> {
        Ok(self.lock_engine("snapshot")?.snapshot())
    }

    /// Steps needed for the estimation distance; fails before calibration
    pub fn target_step_estimate(&self) -> Result<u64, TrackerError> {
        self.lock_engine("target_step_estimate")?
            .target_step_estimate()
            .inspect_err(|err| log_tracker_error(err, "target_step_estimate"))
    }

    // ========================================================================
    // HELPER METHODS - Lock management and rejection reporting
    // ========================================================================

    /// Safely acquire lock on the engine
    fn lock_engine(
        &self,
        context: &str,
    ) -> Result<MutexGuard<'_, CalibrationEngine>, TrackerError> {
        self.engine.lock().map_err(|_| Self::poisoned(context))
    }

    fn read_session(&self, context: &str) -> Result<RwLockReadGuard<'_, u64>, TrackerError> {
        self.session.read().map_err(|_| Self::poisoned(context))
    }

    fn write_session(&self, context: &str) -> Result<RwLockWriteGuard<'_, u64>, TrackerError> {
        self.session.write().map_err(|_| Self::poisoned(context))
    }

    fn poisoned(context: &str) -> TrackerError {
        let err = TrackerError::StatePoisoned;
        log_tracker_error(&err, context);
        err
    }

    fn ensure_session(current: u64, submitted: u64, input: TrackerInput) -> Result<(), TrackerError> {
        if current == submitted {
            return Ok(());
        }
        log::debug!(
            "[TrackerManager] Dropping {} from session {} (now {})",
            input.label(),
            submitted,
            current
        );
        Err(TrackerError::EngineUnavailable {
            reason: "input superseded by reset".to_string(),
        })
    }

    fn reject(err: &TrackerError, context: &str) {
        log_tracker_error(err, context);
        telemetry::hub().record_rejection(err, context);
    }
}

impl Default for TrackerManager {
    fn default() -> Self {
        Self::new(CalibrationConfig::default(), DisplacementConfig::default())
    }
}
