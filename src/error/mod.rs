// Error types for the stride calibrator
//
// This module defines the error taxonomy for the step/distance tracker,
// providing structured error handling with error codes suitable for FFI communication.

mod tracker;

pub use tracker::{log_tracker_error, ErrorKind, TrackerError, TrackerErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the FFI boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
