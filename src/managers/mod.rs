// Managers Module
//
// Each manager handles one specific concern:
// - TrackerManager: Calibration engine ownership and input serialization
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod tracker_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use tracker_manager::TrackerManager;
