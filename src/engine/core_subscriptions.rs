use std::sync::atomic::Ordering;

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::calibration::TrackerSnapshot;
use crate::config::AppConfig;

use super::EngineHandle;

impl EngineHandle {
    // ========================================================================
    // STREAM SUBSCRIPTIONS
    // ========================================================================

    /// Receiver for snapshots published after each accepted input.
    pub fn subscribe_snapshots(&self) -> Option<broadcast::Receiver<TrackerSnapshot>> {
        self.broadcasts.subscribe_snapshots()
    }

    /// Snapshot stream; lagged items are skipped.
    pub fn snapshot_stream(&self) -> impl Stream<Item = TrackerSnapshot> + Send + Unpin {
        let receiver = self.subscribe_snapshots();
        futures::stream::iter(receiver)
            .flat_map(BroadcastStream::new)
            .filter_map(|result| async move {
                match result {
                    Ok(snapshot) => Some(snapshot),
                    Err(err) => {
                        log::debug!("[EngineHandle] Snapshot subscriber lagged: {}", err);
                        None
                    }
                }
            })
            .boxed()
    }

    // ========================================================================
    // TOOLING HELPERS
    // ========================================================================

    /// Inputs drained by the command worker so far.
    pub fn processed_inputs(&self) -> u64 {
        self.processed_inputs.load(Ordering::Relaxed)
    }

    /// Commands currently waiting in the queue.
    pub fn queued_inputs(&self) -> usize {
        self.command_tx
            .max_capacity()
            .saturating_sub(self.command_tx.capacity())
    }

    /// Whether the command worker thread has been started.
    pub fn is_worker_running(&self) -> bool {
        self.command_worker_started.load(Ordering::SeqCst)
    }

    /// Milliseconds elapsed since the handle was created.
    pub fn uptime_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }

    /// Snapshot the current app configuration (tooling helper).
    pub fn config_snapshot(&self) -> AppConfig {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .unwrap_or_else(|err| err.into_inner().clone())
    }
}
