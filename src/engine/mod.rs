//! Engine module housing the tracker orchestration layer.
//!
//! `EngineHandle` (`core`) owns the tracker and its channels; `input` defines
//! the messages hosts deliver to it.

pub mod core;
pub mod input;

pub use core::EngineHandle;
pub use input::TrackerInput;
