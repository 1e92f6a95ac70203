// Error types for the talk envelope pipeline
//
// The sampling/DSP path is infallible by construction (inputs are clamped or
// guarded); these errors cover construction, configuration and the hardware
// boundary, with numeric codes suitable for logs and CLI diagnostics.

mod mic;

pub use mic::{log_mic_error, MicError, MicErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
