// Microphone pipeline error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Microphone error code constants
///
/// Single source of truth for the numeric codes reported by [`MicError`]
/// (and by the CLI in its JSON diagnostics).
///
/// Error code range: 2001-2007
pub struct MicErrorCodes {}

impl MicErrorCodes {
    /// A second microphone was constructed while one already exists
    pub const ALREADY_CONSTRUCTED: i32 = 2001;

    /// A window was requested with zero capacity
    pub const INVALID_WINDOW: i32 = 2002;

    /// Configuration value out of range
    pub const INVALID_CONFIG: i32 = 2003;

    /// Critical-section Mutex was poisoned
    pub const LOCK_POISONED: i32 = 2004;

    /// Analog source could not be opened
    pub const SOURCE_UNAVAILABLE: i32 = 2005;

    /// Periodic timer could not be registered or started
    pub const TIMER_FAILED: i32 = 2006;

    /// Fixture could not be loaded or replayed
    pub const FIXTURE_FAILED: i32 = 2007;
}

/// Log a microphone error with structured context
///
/// Fields:
/// - error_code: Numeric error code for programmatic handling
/// - component: always `Mic`
/// - message: Human-readable error message
/// - context: Where the error surfaced
pub fn log_mic_error(err: &MicError, context: &str) {
    error!(
        "Mic error in {}: code={}, component=Mic, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Microphone pipeline errors
///
/// The DSP path itself never fails; these cover construction, configuration
/// and the desktop/hardware boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum MicError {
    /// Only one microphone may own the sampling interrupt
    AlreadyConstructed { channel: String },

    /// Window capacity must be greater than 0
    InvalidWindow { size: usize },

    /// Configuration rejected by validation or parsing
    InvalidConfig { reason: String },

    /// Mutex guarding interrupt-shared state was poisoned
    LockPoisoned { component: String },

    /// No analog input could be opened
    SourceUnavailable { reason: String },

    /// Timer registration or thread start failed
    TimerFailed { reason: String },

    /// Fixture loading or replay failed
    FixtureFailed { reason: String },
}

impl ErrorCode for MicError {
    fn code(&self) -> i32 {
        match self {
            MicError::AlreadyConstructed { .. } => MicErrorCodes::ALREADY_CONSTRUCTED,
            MicError::InvalidWindow { .. } => MicErrorCodes::INVALID_WINDOW,
            MicError::InvalidConfig { .. } => MicErrorCodes::INVALID_CONFIG,
            MicError::LockPoisoned { .. } => MicErrorCodes::LOCK_POISONED,
            MicError::SourceUnavailable { .. } => MicErrorCodes::SOURCE_UNAVAILABLE,
            MicError::TimerFailed { .. } => MicErrorCodes::TIMER_FAILED,
            MicError::FixtureFailed { .. } => MicErrorCodes::FIXTURE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            MicError::AlreadyConstructed { channel } => {
                format!(
                    "Microphone already constructed on channel {}. Only one instance may own the sampling interrupt.",
                    channel
                )
            }
            MicError::InvalidWindow { size } => {
                format!("Window size must be greater than 0 (got {})", size)
            }
            MicError::InvalidConfig { reason } => format!("Invalid configuration: {}", reason),
            MicError::LockPoisoned { component } => format!("Lock poisoned on {}", component),
            MicError::SourceUnavailable { reason } => {
                format!("Analog source unavailable: {}", reason)
            }
            MicError::TimerFailed { reason } => format!("Periodic timer failed: {}", reason),
            MicError::FixtureFailed { reason } => format!("Fixture failed: {}", reason),
        }
    }
}

impl fmt::Display for MicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MicError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for MicError {}

impl From<std::io::Error> for MicError {
    fn from(err: std::io::Error) -> Self {
        MicError::SourceUnavailable {
            reason: err.to_string(),
        }
    }
}
