//! EngineHandle: tracker orchestration layer.
//!
//! Owns the `TrackerManager`, the snapshot broadcast channel and a bounded
//! `TrackerInput` command queue shared across the CLI, HTTP and JNI entry
//! points. Inputs either go through the queue, drained in FIFO order by a
//! dedicated worker thread, or are applied synchronously; both paths share
//! the manager's lock. Each queued input is stamped with the tracker's
//! session, so a reset from either path drops inputs still waiting from
//! before it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::calibration::TrackerSnapshot;
use crate::config::AppConfig;
use crate::engine::input::TrackerInput;
use crate::error::{log_tracker_error, TrackerError};
use crate::managers::{BroadcastChannelManager, TrackerManager};
use crate::telemetry;

#[path = "core_subscriptions.rs"]
mod core_subscriptions;

type Reply = oneshot::Sender<Result<TrackerSnapshot, TrackerError>>;

/// Queued input, the session it was submitted in, and an optional reply slot.
struct Command {
    input: TrackerInput,
    session: u64,
    reply: Option<Reply>,
}

/// EngineHandle orchestrates the tracker and its shared channels.
pub struct EngineHandle {
    config: Arc<RwLock<AppConfig>>,
    tracker: Arc<TrackerManager>,
    pub(crate) broadcasts: Arc<BroadcastChannelManager>,
    command_tx: mpsc::Sender<Command>,
    command_rx: Arc<Mutex<mpsc::Receiver<Command>>>,
    command_worker_started: AtomicBool,
    processed_inputs: Arc<AtomicU64>,
    start_instant: Instant,
}

impl EngineHandle {
    /// Create a new EngineHandle with platform defaults.
    pub fn new() -> Self {
        Self::from_config(AppConfig::load())
    }

    /// Create an EngineHandle; an invalid config is replaced by the defaults.
    pub fn from_config(initial_config: AppConfig) -> Self {
        let initial_config = initial_config.validated();
        let tracker = TrackerManager::new(
            initial_config.calibration.clone(),
            initial_config.displacement.clone(),
        );
        let broadcasts = BroadcastChannelManager::new();
        if broadcasts
            .init_snapshots(initial_config.telemetry.channel_capacity)
            .is_none()
        {
            log::warn!("[EngineHandle] Snapshot channel unavailable");
        }
        let (command_tx, command_rx) =
            mpsc::channel(initial_config.telemetry.command_queue_capacity.max(1));

        Self {
            config: Arc::new(RwLock::new(initial_config)),
            tracker: Arc::new(tracker),
            broadcasts: Arc::new(broadcasts),
            command_tx,
            command_rx: Arc::new(Mutex::new(command_rx)),
            command_worker_started: AtomicBool::new(false),
            processed_inputs: Arc::new(AtomicU64::new(0)),
            start_instant: Instant::now(),
        }
    }

    fn init_command_worker(&self) -> Result<(), TrackerError> {
        if self
            .command_worker_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let started = self.spawn_command_worker();
        if let Err(err) = &started {
            self.command_worker_started.store(false, Ordering::SeqCst);
            log_tracker_error(err, "init_command_worker");
        }
        started
    }

    fn spawn_command_worker(&self) -> Result<(), TrackerError> {
        let tracker = Arc::clone(&self.tracker);
        let broadcasts = Arc::clone(&self.broadcasts);
        let processed = Arc::clone(&self.processed_inputs);
        let command_rx = Arc::clone(&self.command_rx);

        // The host may not provide a Tokio runtime, so the worker owns one.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| TrackerError::EngineUnavailable {
                reason: format!("failed to build worker runtime: {}", err),
            })?;

        std::thread::Builder::new()
            .name("stride-command-worker".to_string())
            .spawn(move || {
                rt.block_on(async move {
                    loop {
                        let command = {
                            let mut guard = command_rx.lock().await;
                            guard.recv().await
                        };

                        let Some(Command {
                            input,
                            session,
                            reply,
                        }) = command
                        else {
                            break;
                        };

                        let result = tracker
                            .apply_in_session(session, input)
                            .inspect(|snapshot| {
                                broadcasts.publish_snapshot(snapshot);
                            });
                        processed.fetch_add(1, Ordering::Relaxed);
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    log::debug!("[EngineHandle] Command queue closed; worker exiting");
                });
            })
            .map(|_| ())
            .map_err(|err| TrackerError::EngineUnavailable {
                reason: format!("failed to spawn worker thread: {}", err),
            })
    }

    fn command(&self, input: TrackerInput, reply: Option<Reply>) -> Result<Command, TrackerError> {
        Ok(Command {
            input,
            session: self.tracker.session()?,
            reply,
        })
    }

    fn record_queue_occupancy(&self) {
        let max = self.command_tx.max_capacity();
        let used = max.saturating_sub(self.command_tx.capacity());
        let percent = used as f32 / max.max(1) as f32 * 100.0;
        telemetry::hub().record_queue_occupancy("commands", percent);
    }

    fn closed_queue() -> TrackerError {
        TrackerError::EngineUnavailable {
            reason: "command queue closed".to_string(),
        }
    }

    // ========================================================================
    // MESSAGE-PASSING INPUT
    // ========================================================================

    /// Queue an input, waiting for capacity when the queue is full.
    pub async fn submit(&self, input: TrackerInput) -> Result<(), TrackerError> {
        self.init_command_worker()?;
        let command = self.command(input, None)?;
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Self::closed_queue())?;
        self.record_queue_occupancy();
        Ok(())
    }

    /// Queue an input without waiting.
    ///
    /// # Errors
    /// - `EngineUnavailable` when the queue is full or closed
    pub fn try_submit(&self, input: TrackerInput) -> Result<(), TrackerError> {
        self.init_command_worker()?;
        let command = self.command(input, None)?;
        self.command_tx
            .try_send(command)
            .map_err(|err| {
                let err = match err {
                    mpsc::error::TrySendError::Full(_) => TrackerError::EngineUnavailable {
                        reason: "command queue full".to_string(),
                    },
                    mpsc::error::TrySendError::Closed(_) => Self::closed_queue(),
                };
                log_tracker_error(&err, "try_submit");
                err
            })?;
        self.record_queue_occupancy();
        Ok(())
    }

    /// Queue an input and wait for its result.
    ///
    /// Every input queued earlier is applied first.
    pub async fn request(&self, input: TrackerInput) -> Result<TrackerSnapshot, TrackerError> {
        self.init_command_worker()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = self.command(input, Some(reply_tx))?;
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Self::closed_queue())?;
        self.record_queue_occupancy();

        reply_rx.await.map_err(|_| TrackerError::EngineUnavailable {
            reason: "command worker dropped the reply".to_string(),
        })?
    }

    // ========================================================================
    // SYNCHRONOUS INPUT
    // ========================================================================

    /// Apply an input on the calling thread.
    pub fn apply(&self, input: TrackerInput) -> Result<TrackerSnapshot, TrackerError> {
        let snapshot = self.tracker.apply(input)?;
        self.broadcasts.publish_snapshot(&snapshot);
        Ok(snapshot)
    }

    pub fn on_step_update(&self, raw_step_count: i64) -> Result<TrackerSnapshot, TrackerError> {
        self.apply(TrackerInput::StepSample {
            raw_count: raw_step_count,
        })
    }

    pub fn on_displacement_fix(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<TrackerSnapshot, TrackerError> {
        self.apply(TrackerInput::PositionFix {
            latitude,
            longitude,
        })
    }

    /// Reset the session; inputs queued before this call are dropped.
    pub fn reset(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.apply(TrackerInput::Reset)
    }

    pub fn snapshot(&self) -> Result<TrackerSnapshot, TrackerError> {
        self.tracker.snapshot()
    }

    pub fn target_step_estimate(&self) -> Result<u64, TrackerError> {
        self.tracker.target_step_estimate()
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}
