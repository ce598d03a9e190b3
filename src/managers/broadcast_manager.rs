// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::calibration::TrackerSnapshot;

/// Manages the tracker snapshot broadcast channel
///
/// Every accepted input publishes the resulting `TrackerSnapshot`. Hosts,
/// the debug server and tests subscribe independently.
///
/// # Notes
/// - Old snapshots are dropped when a subscriber lags past the buffer
/// - Publishing without subscribers is not an error
pub struct BroadcastChannelManager {
    snapshots: Arc<Mutex<Option<broadcast::Sender<TrackerSnapshot>>>>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with the channel uninitialized
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(None)),
        }
    }

    /// Initialize the snapshot channel
    ///
    /// # Arguments
    /// * `capacity` - Buffered snapshots per subscriber before lagging
    ///
    /// # Returns
    /// `Option<broadcast::Sender<TrackerSnapshot>>` - None if the lock is poisoned
    pub fn init_snapshots(&self, capacity: usize) -> Option<broadcast::Sender<TrackerSnapshot>> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let mut guard = self.snapshots.lock().ok()?;
        *guard = Some(tx.clone());
        Some(tx)
    }

    /// Subscribe to tracker snapshots
    ///
    /// Returns None if `init_snapshots()` has not been called.
    pub fn subscribe_snapshots(&self) -> Option<broadcast::Receiver<TrackerSnapshot>> {
        self.snapshots
            .lock()
            .ok()?
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    /// Publish a snapshot to all current subscribers
    ///
    /// # Returns
    /// Number of subscribers that received the snapshot
    pub fn publish_snapshot(&self, snapshot: &TrackerSnapshot) -> usize {
        let Ok(guard) = self.snapshots.lock() else {
            log::warn!("[BroadcastChannelManager] Snapshot channel lock poisoned");
            return 0;
        };
        guard
            .as_ref()
            .and_then(|tx| tx.send(snapshot.clone()).ok())
            .unwrap_or(0)
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationEngine;

    #[test]
    fn test_snapshot_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();

        // Initially no subscription possible
        assert!(manager.subscribe_snapshots().is_none());

        manager.init_snapshots(8).unwrap();

        assert!(manager.subscribe_snapshots().is_some());
    }

    #[test]
    fn test_snapshot_multiple_subscribers() {
        let manager = BroadcastChannelManager::new();
        manager.init_snapshots(8).unwrap();

        let mut rx1 = manager.subscribe_snapshots().unwrap();
        let mut rx2 = manager.subscribe_snapshots().unwrap();

        let snapshot = CalibrationEngine::new_default().snapshot();
        assert_eq!(manager.publish_snapshot(&snapshot), 2);

        assert_eq!(rx1.try_recv().unwrap(), snapshot);
        assert_eq!(rx2.try_recv().unwrap(), snapshot);
    }

    #[test]
    fn test_publish_without_channel_or_subscribers() {
        let manager = BroadcastChannelManager::default();
        let snapshot = CalibrationEngine::new_default().snapshot();

        assert_eq!(manager.publish_snapshot(&snapshot), 0);

        manager.init_snapshots(8).unwrap();
        assert_eq!(manager.publish_snapshot(&snapshot), 0);
    }
}
